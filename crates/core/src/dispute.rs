//! Dispute status transitions.

use crate::types::DisputeStatus;

impl DisputeStatus {
    /// Whether the dispute is settled and can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Won | Self::Lost | Self::Closed)
    }

    /// Whether a dispute may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Open => matches!(
                next,
                Self::UnderReview | Self::Won | Self::Lost | Self::Closed
            ),
            Self::UnderReview => matches!(next, Self::Won | Self::Lost | Self::Closed),
            Self::Won | Self::Lost | Self::Closed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_moves_forward() {
        assert!(DisputeStatus::Open.can_transition_to(DisputeStatus::UnderReview));
        assert!(DisputeStatus::Open.can_transition_to(DisputeStatus::Lost));
        assert!(!DisputeStatus::Open.can_transition_to(DisputeStatus::Open));
    }

    #[test]
    fn test_under_review_cannot_reopen() {
        assert!(DisputeStatus::UnderReview.can_transition_to(DisputeStatus::Won));
        assert!(!DisputeStatus::UnderReview.can_transition_to(DisputeStatus::Open));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for status in [DisputeStatus::Won, DisputeStatus::Lost, DisputeStatus::Closed] {
            assert!(status.is_terminal());
            for next in DisputeStatus::ALL {
                assert!(!status.can_transition_to(*next));
            }
        }
        assert!(!DisputeStatus::Open.is_terminal());
    }
}
