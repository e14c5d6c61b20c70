//! Host run states and the allowed transition graph
//!
//! ```text
//! PRECHECKS -> ENTER_MAINT -> APPLY -> POSTCHECKS -> EXIT_MAINT -> DONE
//!     \            \           \          \             \
//!      +------------+-----------+----------+-------------+--> ERROR
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostRunState {
    Prechecks,
    EnterMaint,
    Apply,
    Postchecks,
    ExitMaint,
    Done,
    Error,
}

impl HostRunState {
    pub const ALL: [HostRunState; 7] = [
        HostRunState::Prechecks,
        HostRunState::EnterMaint,
        HostRunState::Apply,
        HostRunState::Postchecks,
        HostRunState::ExitMaint,
        HostRunState::Done,
        HostRunState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HostRunState::Prechecks => "PRECHECKS",
            HostRunState::EnterMaint => "ENTER_MAINT",
            HostRunState::Apply => "APPLY",
            HostRunState::Postchecks => "POSTCHECKS",
            HostRunState::ExitMaint => "EXIT_MAINT",
            HostRunState::Done => "DONE",
            HostRunState::Error => "ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == value)
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, HostRunState::Done | HostRunState::Error)
    }

    /// The single forward successor of a non-terminal state
    pub fn next(&self) -> Option<HostRunState> {
        match self {
            HostRunState::Prechecks => Some(HostRunState::EnterMaint),
            HostRunState::EnterMaint => Some(HostRunState::Apply),
            HostRunState::Apply => Some(HostRunState::Postchecks),
            HostRunState::Postchecks => Some(HostRunState::ExitMaint),
            HostRunState::ExitMaint => Some(HostRunState::Done),
            HostRunState::Done | HostRunState::Error => None,
        }
    }

    pub fn can_transition_to(&self, target: HostRunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        target == HostRunState::Error || self.next() == Some(target)
    }

    /// Every edge leaving this state, forward edge first
    pub fn outgoing(&self) -> Vec<HostRunState> {
        match self.next() {
            Some(next) => vec![next, HostRunState::Error],
            None => Vec::new(),
        }
    }

    /// Overall progress shown while the run is in this state
    pub fn progress(&self) -> u8 {
        match self {
            HostRunState::Prechecks => 0,
            HostRunState::EnterMaint => 15,
            HostRunState::Apply => 35,
            HostRunState::Postchecks => 70,
            HostRunState::ExitMaint => 85,
            HostRunState::Done => 100,
            HostRunState::Error => 0,
        }
    }
}

impl fmt::Display for HostRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for state in [HostRunState::Done, HostRunState::Error] {
            assert!(state.outgoing().is_empty());
            for target in HostRunState::ALL {
                assert!(!state.can_transition_to(target));
            }
        }
    }

    #[test]
    fn every_live_state_can_fail() {
        for state in HostRunState::ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(state.can_transition_to(HostRunState::Error));
        }
    }

    #[test]
    fn graph_has_exactly_the_forward_chain_and_error_edges() {
        let mut edges = 0;
        for from in HostRunState::ALL {
            for to in HostRunState::ALL {
                if from.can_transition_to(to) {
                    edges += 1;
                    assert!(to == HostRunState::Error || from.next() == Some(to));
                }
            }
        }
        // five forward edges plus five edges into ERROR
        assert_eq!(edges, 10);
    }

    #[test]
    fn no_state_can_reach_itself() {
        for state in HostRunState::ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn names_match_wire_format() {
        assert_eq!(
            serde_json::to_string(&HostRunState::EnterMaint).unwrap(),
            "\"ENTER_MAINT\""
        );
        assert_eq!(HostRunState::parse("EXIT_MAINT"), Some(HostRunState::ExitMaint));
        assert_eq!(HostRunState::parse("exit_maint"), None);
    }
}
