//! The request status DAG (spec §4.1). Transitions are enforced by the
//! repository's conditional `UPDATE … WHERE status = expected` calls, not
//! by this enum — this module only names the states and the guard each
//! transition requires, so callers can't typo a status string.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    PendingApproval,
    Approved,
    Executing,
    ChangeRequested,
    Completed,
    Failed,
    Denied,
    Expired,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::PendingApproval => "pending_approval",
            RequestStatus::Approved => "approved",
            RequestStatus::Executing => "executing",
            RequestStatus::ChangeRequested => "change_requested",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
            RequestStatus::Denied => "denied",
            RequestStatus::Expired => "expired",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses are immutable except for retention deletion
    /// (spec §3: "Terminal status").
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed
                | RequestStatus::Failed
                | RequestStatus::Denied
                | RequestStatus::Expired
                | RequestStatus::Cancelled
        )
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_approval" => Ok(RequestStatus::PendingApproval),
            "approved" => Ok(RequestStatus::Approved),
            "executing" => Ok(RequestStatus::Executing),
            "change_requested" => Ok(RequestStatus::ChangeRequested),
            "completed" => Ok(RequestStatus::Completed),
            "failed" => Ok(RequestStatus::Failed),
            "denied" => Ok(RequestStatus::Denied),
            "expired" => Ok(RequestStatus::Expired),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(anyhow::anyhow!("unknown request status: {other}")),
        }
    }
}

/// Statuses from which a human decision (approve/deny/suggest) or an
/// owner cancel is accepted.
pub const DECIDABLE_STATUSES: [RequestStatus; 2] =
    [RequestStatus::PendingApproval, RequestStatus::ChangeRequested];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_exactly_the_five_named_in_spec() {
        let terminal: Vec<_> = [
            RequestStatus::PendingApproval,
            RequestStatus::Approved,
            RequestStatus::Executing,
            RequestStatus::ChangeRequested,
            RequestStatus::Completed,
            RequestStatus::Failed,
            RequestStatus::Denied,
            RequestStatus::Expired,
            RequestStatus::Cancelled,
        ]
        .into_iter()
        .filter(|s| s.is_terminal())
        .collect();
        assert_eq!(terminal.len(), 5);
    }

    #[test]
    fn as_str_round_trips_through_from_str() {
        for status in [
            RequestStatus::PendingApproval,
            RequestStatus::Approved,
            RequestStatus::Executing,
            RequestStatus::ChangeRequested,
            RequestStatus::Completed,
            RequestStatus::Failed,
            RequestStatus::Denied,
            RequestStatus::Expired,
            RequestStatus::Cancelled,
        ] {
            let parsed: RequestStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
