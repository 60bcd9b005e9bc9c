//! Declarative table of legal request transitions.
//!
//! Rules are keyed on the `(from, to)` pair and carry the set of roles allowed
//! to use that edge, so the same role may reach different destinations from the
//! same source with a different reason policy per edge.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

use crate::request_lifecycle::types::{Role, State};

/// One row of the transition table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRule {
    pub from: State,
    pub to: State,
    pub allowed_roles: BTreeSet<Role>,
    pub requires_reason: bool,
    pub description: &'static str,
}

impl TransitionRule {
    pub fn new(
        from: State,
        to: State,
        roles: &[Role],
        requires_reason: bool,
        description: &'static str,
    ) -> Self {
        Self {
            from,
            to,
            allowed_roles: roles.iter().copied().collect(),
            requires_reason,
            description,
        }
    }

    pub fn allows(&self, role: Role) -> bool {
        self.allowed_roles.contains(&role)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Rule {from} -> {to} has no allowed roles")]
    EmptyRoles { from: State, to: State },
    #[error("Duplicate rule {from} -> {to}")]
    DuplicateRule { from: State, to: State },
}

/// Immutable transition graph, built once and shared by reference
#[derive(Debug, Clone)]
pub struct StateGraph {
    rules: Vec<TransitionRule>,
    index: HashMap<(State, State), usize>,
}

impl StateGraph {
    /// Builds a graph from an arbitrary rule table
    pub fn from_rules(rules: Vec<TransitionRule>) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(rules.len());
        for (position, rule) in rules.iter().enumerate() {
            if rule.allowed_roles.is_empty() {
                return Err(GraphError::EmptyRoles {
                    from: rule.from,
                    to: rule.to,
                });
            }
            if index.insert((rule.from, rule.to), position).is_some() {
                return Err(GraphError::DuplicateRule {
                    from: rule.from,
                    to: rule.to,
                });
            }
        }
        Ok(Self { rules, index })
    }

    /// The depot's import/export lifecycle
    pub fn depot() -> Self {
        // The built-in table has no empty role sets and no duplicates.
        let rules = depot_rules();
        let index = rules
            .iter()
            .enumerate()
            .map(|(position, rule)| ((rule.from, rule.to), position))
            .collect();
        Self { rules, index }
    }

    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    /// True iff `state` names a member of the closed state enumeration
    pub fn is_valid_state(&self, state: &str) -> bool {
        state.parse::<State>().is_ok()
    }

    /// Every edge out of `from` that `role` may use
    pub fn valid_transitions(&self, from: State, role: Role) -> Vec<&TransitionRule> {
        self.rules
            .iter()
            .filter(|rule| rule.from == from && rule.allows(role))
            .collect()
    }

    pub fn get_transition(&self, from: State, to: State, role: Role) -> Option<&TransitionRule> {
        self.index
            .get(&(from, to))
            .map(|&position| &self.rules[position])
            .filter(|rule| rule.allows(role))
    }

    pub fn can_transition(&self, from: State, to: State, role: Role) -> bool {
        self.get_transition(from, to, role).is_some()
    }

    /// A state with no outgoing edges for any role
    pub fn is_terminal(&self, state: State) -> bool {
        !self.rules.iter().any(|rule| rule.from == state)
    }
}

impl Default for StateGraph {
    fn default() -> Self {
        Self::depot()
    }
}

fn depot_rules() -> Vec<TransitionRule> {
    use Role::*;
    use State::*;

    vec![
        TransitionRule::new(Pending, Scheduled, &[SaleAdmin, SystemAdmin], false,
            "Depot accepts the request and schedules an appointment"),
        TransitionRule::new(Pending, PickContainer, &[SaleAdmin, SystemAdmin], false,
            "Depot assigns an empty container to an export request"),
        TransitionRule::new(Pending, Rejected, &[SaleAdmin, SystemAdmin], true,
            "Depot declines the request"),
        TransitionRule::new(PickContainer, Scheduled,
            &[CustomerAdmin, CustomerUser, SaleAdmin, SystemAdmin], false,
            "Export documents supplied, appointment confirmed"),
        TransitionRule::new(PickContainer, Rejected, &[SaleAdmin, SystemAdmin], true,
            "Container assignment cancelled"),
        TransitionRule::new(Scheduled, ScheduledInfoAdded, &[CustomerAdmin, CustomerUser], false,
            "Customer adds appointment details"),
        TransitionRule::new(Scheduled, Forwarded, &[CustomerAdmin, CustomerUser, SaleAdmin], false,
            "Supplement supplied, request forwarded to depot"),
        TransitionRule::new(Scheduled, SentToGate, &[SaleAdmin, SystemAdmin], false,
            "Depot sends the request straight to the gate"),
        TransitionRule::new(Scheduled, Rejected, &[SaleAdmin, SystemAdmin], true,
            "Depot cancels the appointment"),
        TransitionRule::new(ScheduledInfoAdded, Forwarded,
            &[CustomerAdmin, CustomerUser, SaleAdmin], false,
            "Supplement supplied after details were added"),
        TransitionRule::new(ScheduledInfoAdded, SentToGate, &[SaleAdmin, SystemAdmin], false,
            "Depot sends the request to the gate"),
        TransitionRule::new(ScheduledInfoAdded, Rejected, &[SaleAdmin, SystemAdmin], true,
            "Depot cancels the appointment"),
        TransitionRule::new(Forwarded, SentToGate, &[SaleAdmin, SystemAdmin], false,
            "Depot releases the request to the gate"),
        TransitionRule::new(Forwarded, Scheduled, &[SaleAdmin], true,
            "Depot returns the request for more information"),
        TransitionRule::new(Forwarded, Rejected, &[SaleAdmin, SystemAdmin], true,
            "Depot rejects the forwarded documents"),
        TransitionRule::new(SentToGate, GateIn, &[Security], false,
            "Truck checked in at the gate"),
        TransitionRule::new(SentToGate, Rejected, &[Security, SaleAdmin], true,
            "Gate refuses entry"),
        TransitionRule::new(GateIn, Checking, &[Security, SaleAdmin, MaintenanceManager], false,
            "Container moved to inspection"),
        TransitionRule::new(GateIn, Completed, &[Security, SaleAdmin], false,
            "Export pickup handed over at the gate"),
        TransitionRule::new(Checking, Checked, &[SaleAdmin, MaintenanceManager], false,
            "Inspection finished"),
        TransitionRule::new(Checking, Rejected, &[SaleAdmin, SystemAdmin], true,
            "Container failed inspection"),
        TransitionRule::new(Checked, PendingAccept, &[SaleAdmin], false,
            "Inspection result sent to customer for acceptance"),
        TransitionRule::new(Checked, Completed, &[SaleAdmin], false,
            "Import closed without yard storage"),
        TransitionRule::new(PendingAccept, Accept, &[CustomerAdmin, CustomerUser], false,
            "Customer accepts the inspection result"),
        TransitionRule::new(PendingAccept, Rejected, &[CustomerAdmin, CustomerUser, SaleAdmin], true,
            "Customer declines the inspection result"),
        TransitionRule::new(Accept, Positioned, &[YardManager], false,
            "Yard slot assigned"),
        TransitionRule::new(Positioned, Forklifting, &[YardManager, Driver], false,
            "Forklift move started"),
        TransitionRule::new(Forklifting, InYard, &[YardManager, Driver], false,
            "Container stored in yard"),
    ]
}
