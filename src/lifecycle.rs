//! Status enums stored as text columns and the transitions each one allows.

use serde::Serialize;
use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("unknown {entity} status '{value}'")]
    UnknownStatus { entity: &'static str, value: String },
    #[error("cannot change {entity} status from {from} to {to}")]
    NotAllowed {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },
    #[error("{entity} status changed while this request was in progress")]
    Concurrent { entity: &'static str },
}

impl From<TransitionError> for AppError {
    fn from(value: TransitionError) -> Self {
        AppError::bad_request(value.to_string())
    }
}

pub trait Lifecycle: Sized + Copy + PartialEq + 'static {
    const ENTITY: &'static str;
    const ALL: &'static [Self];

    fn as_str(self) -> &'static str;
    fn can_transition(self, to: Self) -> bool;

    fn parse(raw: &str) -> Result<Self, TransitionError> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == raw)
            .ok_or_else(|| TransitionError::UnknownStatus {
                entity: Self::ENTITY,
                value: raw.to_string(),
            })
    }

    /// Stored values `to` can be reached from, for filtering guarded updates.
    fn sources(to: Self) -> Vec<&'static str> {
        Self::ALL
            .iter()
            .copied()
            .filter(|from| from.can_transition(to))
            .map(Self::as_str)
            .collect()
    }

    fn transition(self, to: Self) -> Result<Self, TransitionError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(TransitionError::NotAllowed {
                entity: Self::ENTITY,
                from: self.as_str(),
                to: to.as_str(),
            })
        }
    }
}

/// Applies `to` to a stored status string.
pub fn advance<S: Lifecycle>(stored: &str, to: S) -> Result<S, TransitionError> {
    S::parse(stored)?.transition(to)
}

/// Checks the row count of an update filtered on the status it was read with.
/// No rows means another request moved the record first.
pub fn ensure_applied<S: Lifecycle>(affected: usize) -> Result<(), TransitionError> {
    if affected == 0 {
        Err(TransitionError::Concurrent { entity: S::ENTITY })
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimesheetStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl TimesheetStatus {
    /// Entries may only be edited before submission or after a rejection.
    pub fn is_editable(self) -> bool {
        matches!(self, TimesheetStatus::Draft | TimesheetStatus::Rejected)
    }
}

impl Lifecycle for TimesheetStatus {
    const ENTITY: &'static str = "timesheet";
    const ALL: &'static [Self] = &[
        TimesheetStatus::Draft,
        TimesheetStatus::Submitted,
        TimesheetStatus::Approved,
        TimesheetStatus::Rejected,
    ];

    fn as_str(self) -> &'static str {
        match self {
            TimesheetStatus::Draft => "draft",
            TimesheetStatus::Submitted => "submitted",
            TimesheetStatus::Approved => "approved",
            TimesheetStatus::Rejected => "rejected",
        }
    }

    fn can_transition(self, to: Self) -> bool {
        use TimesheetStatus::*;
        matches!(
            (self, to),
            (Draft, Submitted) | (Rejected, Submitted) | (Submitted, Approved) | (Submitted, Rejected)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    Draft,
    Submitted,
    Reviewed,
}

impl Lifecycle for InspectionStatus {
    const ENTITY: &'static str = "inspection";
    const ALL: &'static [Self] = &[
        InspectionStatus::Draft,
        InspectionStatus::Submitted,
        InspectionStatus::Reviewed,
    ];

    fn as_str(self) -> &'static str {
        match self {
            InspectionStatus::Draft => "draft",
            InspectionStatus::Submitted => "submitted",
            InspectionStatus::Reviewed => "reviewed",
        }
    }

    fn can_transition(self, to: Self) -> bool {
        use InspectionStatus::*;
        matches!((self, to), (Draft, Submitted) | (Submitted, Reviewed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Read,
    Signed,
}

impl Lifecycle for AssignmentStatus {
    const ENTITY: &'static str = "assignment";
    const ALL: &'static [Self] = &[
        AssignmentStatus::Pending,
        AssignmentStatus::Read,
        AssignmentStatus::Signed,
    ];

    fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Read => "read",
            AssignmentStatus::Signed => "signed",
        }
    }

    fn can_transition(self, to: Self) -> bool {
        use AssignmentStatus::*;
        matches!((self, to), (Pending, Read) | (Pending, Signed) | (Read, Signed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Read,
    Signed,
    Dismissed,
}

impl RecipientStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RecipientStatus::Signed | RecipientStatus::Dismissed)
    }
}

impl Lifecycle for RecipientStatus {
    const ENTITY: &'static str = "message";
    const ALL: &'static [Self] = &[
        RecipientStatus::Pending,
        RecipientStatus::Read,
        RecipientStatus::Signed,
        RecipientStatus::Dismissed,
    ];

    fn as_str(self) -> &'static str {
        match self {
            RecipientStatus::Pending => "pending",
            RecipientStatus::Read => "read",
            RecipientStatus::Signed => "signed",
            RecipientStatus::Dismissed => "dismissed",
        }
    }

    fn can_transition(self, to: Self) -> bool {
        use RecipientStatus::*;
        matches!(
            (self, to),
            (Pending, Read) | (Pending, Signed) | (Read, Signed) | (Pending, Dismissed) | (Read, Dismissed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl Lifecycle for TaskStatus {
    const ENTITY: &'static str = "workshop task";
    const ALL: &'static [Self] = &[
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ];

    fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    fn can_transition(self, to: Self) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress) | (InProgress, Completed) | (Completed, InProgress)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    New,
    Investigating,
    Resolved,
}

impl Lifecycle for ReportStatus {
    const ENTITY: &'static str = "error report";
    const ALL: &'static [Self] = &[
        ReportStatus::New,
        ReportStatus::Investigating,
        ReportStatus::Resolved,
    ];

    fn as_str(self) -> &'static str {
        match self {
            ReportStatus::New => "new",
            ReportStatus::Investigating => "investigating",
            ReportStatus::Resolved => "resolved",
        }
    }

    fn can_transition(self, to: Self) -> bool {
        use ReportStatus::*;
        matches!(
            (self, to),
            (New, Investigating) | (Investigating, Resolved) | (New, Resolved)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timesheet_resubmission_after_rejection() {
        assert_eq!(
            advance("rejected", TimesheetStatus::Submitted),
            Ok(TimesheetStatus::Submitted)
        );
        assert!(advance("approved", TimesheetStatus::Submitted).is_err());
        assert!(advance("draft", TimesheetStatus::Approved).is_err());
    }

    #[test]
    fn signed_assignment_is_final() {
        for target in AssignmentStatus::ALL {
            assert!(!AssignmentStatus::Signed.can_transition(*target));
        }
        assert!(AssignmentStatus::Pending.can_transition(AssignmentStatus::Signed));
    }

    #[test]
    fn completed_task_can_reopen() {
        assert!(TaskStatus::Completed.can_transition(TaskStatus::InProgress));
        assert!(!TaskStatus::Pending.can_transition(TaskStatus::Completed));
    }

    #[test]
    fn sources_list_every_status_that_reaches_the_target() {
        assert_eq!(AssignmentStatus::sources(AssignmentStatus::Signed), vec!["pending", "read"]);
        assert!(AssignmentStatus::sources(AssignmentStatus::Pending).is_empty());
        assert_eq!(
            TimesheetStatus::sources(TimesheetStatus::Submitted),
            vec!["draft", "rejected"]
        );
    }

    #[test]
    fn guarded_update_that_matched_nothing_is_rejected() {
        assert!(ensure_applied::<AssignmentStatus>(1).is_ok());
        let err = ensure_applied::<AssignmentStatus>(0).unwrap_err();
        assert_eq!(err, TransitionError::Concurrent { entity: AssignmentStatus::ENTITY });
        assert_eq!(AppError::from(err).status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unknown_status_is_reported() {
        let err = InspectionStatus::parse("archived").unwrap_err();
        assert_eq!(err.to_string(), "unknown inspection status 'archived'");
    }

    #[test]
    fn transition_error_becomes_bad_request() {
        let err: AppError = advance("resolved", ReportStatus::New).unwrap_err().into();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(
            err.message(),
            "cannot change error report status from resolved to new"
        );
    }

    #[test]
    fn terminal_recipient_states() {
        assert!(RecipientStatus::Signed.is_terminal());
        assert!(RecipientStatus::Dismissed.is_terminal());
        assert!(!RecipientStatus::Read.is_terminal());
        assert!(!RecipientStatus::Dismissed.can_transition(RecipientStatus::Read));
    }
}
