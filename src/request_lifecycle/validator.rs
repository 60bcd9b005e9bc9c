// Transition validation against the state graph - pure, no side effects

use std::sync::Arc;

use crate::request_lifecycle::errors::TransitionError;
use crate::request_lifecycle::graph::{StateGraph, TransitionRule};
use crate::request_lifecycle::types::{Role, State};

#[derive(Debug, Clone)]
pub struct TransitionValidator {
    graph: Arc<StateGraph>,
}

impl TransitionValidator {
    pub fn new(graph: Arc<StateGraph>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &StateGraph {
        &self.graph
    }

    /// Returns the matched rule, or the first check that failed
    pub fn validate(
        &self,
        role: Role,
        current: State,
        target: State,
        reason: Option<&str>,
    ) -> Result<&TransitionRule, TransitionError> {
        let rule = self
            .graph
            .get_transition(current, target, role)
            .ok_or(TransitionError::Forbidden {
                from: current,
                to: target,
                role,
            })?;

        if rule.requires_reason && !has_text(reason) {
            return Err(TransitionError::ReasonRequired {
                from: current,
                to: target,
            });
        }

        Ok(rule)
    }

    /// Same as [`validate`](Self::validate) for states that arrive as strings
    pub fn validate_raw(
        &self,
        role: Role,
        current: &str,
        target: &str,
        reason: Option<&str>,
    ) -> Result<&TransitionRule, TransitionError> {
        let current: State = current.parse()?;
        let target: State = target.parse()?;
        self.validate(role, current, target, reason)
    }
}

fn has_text(reason: Option<&str>) -> bool {
    reason.is_some_and(|r| !r.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> TransitionValidator {
        TransitionValidator::new(Arc::new(StateGraph::depot()))
    }

    #[test]
    fn test_accepts_edge_without_reason() {
        let v = validator();
        let rule = v
            .validate(Role::SaleAdmin, State::Pending, State::Scheduled, None)
            .unwrap();
        assert_eq!(rule.to, State::Scheduled);
        assert!(!rule.description.is_empty());
    }

    #[test]
    fn test_reason_required_for_blank_reasons() {
        let v = validator();
        for reason in [None, Some(""), Some("   "), Some("\t\n")] {
            let err = v
                .validate(Role::SaleAdmin, State::Pending, State::Rejected, reason)
                .unwrap_err();
            assert!(matches!(err, TransitionError::ReasonRequired { .. }), "{reason:?}");
        }
        assert!(v
            .validate(Role::SaleAdmin, State::Pending, State::Rejected, Some("duplicate booking"))
            .is_ok());
    }

    #[test]
    fn test_forbidden_wins_over_missing_reason() {
        let v = validator();
        let err = v
            .validate(Role::Driver, State::Pending, State::Rejected, None)
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::Forbidden { from: State::Pending, to: State::Rejected, role: Role::Driver }
        ));
    }

    #[test]
    fn test_validate_raw_checks_both_states() {
        let v = validator();
        assert!(matches!(
            v.validate_raw(Role::SaleAdmin, "LOST", "SCHEDULED", None),
            Err(TransitionError::InvalidState(s)) if s == "LOST"
        ));
        assert!(matches!(
            v.validate_raw(Role::SaleAdmin, "PENDING", "SHIPPED", None),
            Err(TransitionError::InvalidState(s)) if s == "SHIPPED"
        ));
        assert!(v
            .validate_raw(Role::SaleAdmin, "PENDING", "SCHEDULED", None)
            .is_ok());
    }

    #[test]
    fn test_validation_is_repeatable() {
        let v = validator();
        let first = v
            .validate(Role::CustomerUser, State::Scheduled, State::Forwarded, None)
            .map(|r| r.description);
        let second = v
            .validate(Role::CustomerUser, State::Scheduled, State::Forwarded, None)
            .map(|r| r.description);
        assert_eq!(first.unwrap(), second.unwrap());
    }
}
