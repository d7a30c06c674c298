//! Recording lifecycle state machine.
//!
//! ```text
//! Uploaded ──▶ Processing ──▶ Processed ──review──▶ Validated
//!                  │  ▲  │          │     ──review──▶ Rejected
//!                  │  └──┼──────────┘  (resubmission)
//!                  ▼     │
//!                Error ──┘  (resubmission)
//! ```
//!
//! `Processing → Processing` is allowed so a duplicate delivery of the same
//! task can re-run.  `Validated` and `Rejected` are terminal for the
//! pipeline; only human review produces them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// A status change the lifecycle does not permit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("illegal status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: RecordingStatus,
    pub to: RecordingStatus,
}

// ---------------------------------------------------------------------------
// RecordingStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    /// Accepted at upload, not yet analysed.
    #[default]
    Uploaded,

    /// Analysis has started.
    Processing,

    /// Analysis and validation succeeded.
    Processed,

    /// Accepted by a human reviewer.
    Validated,

    /// Rejected by a human reviewer.
    Rejected,

    /// Analysis failed or the recording failed a quality gate.
    Error,
}

impl RecordingStatus {
    pub const ALL: [RecordingStatus; 6] = [
        RecordingStatus::Uploaded,
        RecordingStatus::Processing,
        RecordingStatus::Processed,
        RecordingStatus::Validated,
        RecordingStatus::Rejected,
        RecordingStatus::Error,
    ];

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: RecordingStatus) -> bool {
        use RecordingStatus::*;
        matches!(
            (self, next),
            (Uploaded, Processing)
                | (Processing, Processing)
                | (Processing, Processed)
                | (Processing, Error)
                | (Processed, Processing)
                | (Error, Processing)
                | (Processed, Validated)
                | (Processed, Rejected)
        )
    }

    /// `Ok(next)` when the transition is legal.
    pub fn transition(self, next: RecordingStatus) -> Result<RecordingStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    /// `true` once human review has decided the recording's fate.
    pub fn is_reviewed(self) -> bool {
        matches!(self, RecordingStatus::Validated | RecordingStatus::Rejected)
    }

    /// Lowercase wire name, as stored.
    pub fn label(self) -> &'static str {
        match self {
            RecordingStatus::Uploaded => "uploaded",
            RecordingStatus::Processing => "processing",
            RecordingStatus::Processed => "processed",
            RecordingStatus::Validated => "validated",
            RecordingStatus::Rejected => "rejected",
            RecordingStatus::Error => "error",
        }
    }
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RecordingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.label() == s)
            .ok_or_else(|| format!("unknown recording status '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use RecordingStatus::*;

    #[test]
    fn default_is_uploaded() {
        assert_eq!(RecordingStatus::default(), Uploaded);
    }

    #[test]
    fn forward_path_is_legal() {
        assert!(Uploaded.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Processed));
        assert!(Processing.can_transition_to(Error));
        assert!(Processed.can_transition_to(Validated));
        assert!(Processed.can_transition_to(Rejected));
    }

    #[test]
    fn resubmission_is_legal() {
        assert!(Error.can_transition_to(Processing));
        assert!(Processed.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Processing));
    }

    #[test]
    fn processing_is_never_skipped() {
        assert!(!Uploaded.can_transition_to(Processed));
        assert!(!Uploaded.can_transition_to(Error));
        assert!(!Error.can_transition_to(Processed));
    }

    #[test]
    fn reviewed_states_are_final_for_the_pipeline() {
        for next in RecordingStatus::ALL {
            assert!(!Validated.can_transition_to(next), "validated -> {next}");
            assert!(!Rejected.can_transition_to(next), "rejected -> {next}");
        }
        assert!(Validated.is_reviewed());
        assert!(Rejected.is_reviewed());
        assert!(!Processed.is_reviewed());
    }

    #[test]
    fn transition_reports_illegal_pair() {
        let err = Uploaded.transition(Validated).unwrap_err();
        assert_eq!(
            err,
            TransitionError {
                from: Uploaded,
                to: Validated
            }
        );
        assert_eq!(err.to_string(), "illegal status transition uploaded -> validated");
        assert_eq!(Uploaded.transition(Processing), Ok(Processing));
    }

    #[test]
    fn labels_round_trip() {
        for status in RecordingStatus::ALL {
            assert_eq!(status.label().parse::<RecordingStatus>(), Ok(status));
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{}\"", status.label())
            );
        }
        assert!("done".parse::<RecordingStatus>().is_err());
    }
}
