//! Cooldown gate.
//!
//! Advisory only: the ledger claim re-applies the same rule atomically.

use molt_types::{COOLDOWN_SECS, SECS_PER_HOUR};
use serde::Serialize;

/// Whether an agent may mint at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub can_mint: bool,
    /// Seconds until the cooldown ends; 0 when eligible.
    pub cooldown_remaining: u64,
    /// `None` for an agent that never minted.
    pub next_eligible_at: Option<u64>,
}

impl Eligibility {
    /// Remaining cooldown in whole hours, rounded up.
    pub fn hours_remaining(&self) -> u64 {
        self.cooldown_remaining.div_ceil(SECS_PER_HOUR)
    }
}

/// Apply the rolling 24 hour rule to the last recorded mint.
pub fn check_eligibility(last_mint_at: Option<u64>, now: u64) -> Eligibility {
    let Some(last) = last_mint_at else {
        return Eligibility {
            can_mint: true,
            cooldown_remaining: 0,
            next_eligible_at: None,
        };
    };
    let next_eligible_at = last.saturating_add(COOLDOWN_SECS);
    let cooldown_remaining = next_eligible_at.saturating_sub(now);
    Eligibility {
        can_mint: cooldown_remaining == 0,
        cooldown_remaining,
        next_eligible_at: Some(next_eligible_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000;

    #[test]
    fn test_never_minted() {
        let e = check_eligibility(None, T0);
        assert!(e.can_mint);
        assert_eq!(e.hours_remaining(), 0);
        assert_eq!(e.next_eligible_at, None);
    }

    #[test]
    fn test_within_first_hour() {
        let e = check_eligibility(Some(T0), T0 + 1_800);
        assert!(!e.can_mint);
        assert_eq!(e.cooldown_remaining, COOLDOWN_SECS - 1_800);
        assert_eq!(e.hours_remaining(), 24);
        assert_eq!(e.next_eligible_at, Some(T0 + COOLDOWN_SECS));
    }

    #[test]
    fn test_rounds_up_partial_hours() {
        let e = check_eligibility(Some(T0), T0 + COOLDOWN_SECS - 1);
        assert!(!e.can_mint);
        assert_eq!(e.hours_remaining(), 1);
    }

    #[test]
    fn test_exact_boundary() {
        let e = check_eligibility(Some(T0), T0 + COOLDOWN_SECS);
        assert!(e.can_mint);
        assert_eq!(e.cooldown_remaining, 0);
    }

    #[test]
    fn test_future_timestamp_still_blocks() {
        let e = check_eligibility(Some(T0 + 600), T0);
        assert!(!e.can_mint);
        assert_eq!(e.cooldown_remaining, COOLDOWN_SECS + 600);
    }
}
