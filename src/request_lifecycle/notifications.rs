// Canned system messages posted to a request's channel after a transition

use crate::request_lifecycle::types::State;

/// Fixed message for states that have one
fn canned_message(state: State) -> Option<&'static str> {
    let message = match state {
        State::PickContainer => "An empty container has been assigned. Please upload the export documents.",
        State::Scheduled => "Your request has been accepted and an appointment is scheduled.",
        State::ScheduledInfoAdded => "Appointment details have been added.",
        State::Forwarded => "Supplementary documents received. The request has been forwarded to the depot.",
        State::SentToGate => "The request has been sent to the gate. The truck may proceed.",
        State::GateIn => "The truck has checked in at the gate.",
        State::Checking => "The container is being inspected.",
        State::Checked => "Inspection of the container is finished.",
        State::PendingAccept => "Inspection results are ready. Please review and accept them.",
        State::Accept => "The customer accepted the inspection results.",
        State::Positioned => "A yard position has been assigned to the container.",
        State::InYard => "The container is now stored in the yard.",
        State::Rejected => "The request has been rejected.",
        State::Completed => "The request is complete.",
        State::Pending | State::Forklifting => return None,
    };
    Some(message)
}

/// Text posted to the channel when a request enters `state`
pub fn status_message(state: State, reason: Option<&str>) -> String {
    let base = match canned_message(state) {
        Some(message) => message.to_string(),
        None => format!("Request status changed to {state}."),
    };

    match reason.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => format!("{base} Reason: {reason}"),
        None => base,
    }
}
