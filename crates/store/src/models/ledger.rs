//! Token ledger records.

use serde::Serialize;

use atelier_core::types::{JobId, OwnerId, Timestamp};

/// An owner's token balance.
///
/// `balance_remaining` is always `balance_total - balance_used`; reserving
/// bumps `balance_used`, refunding lowers it, and a consume leaves both
/// untouched (the deduction already happened at reserve time).
#[derive(Debug, Clone, Serialize)]
pub struct LedgerAccount {
    pub owner_id: OwnerId,
    pub balance_total: i64,
    pub balance_used: i64,
    pub balance_remaining: i64,
}

impl LedgerAccount {
    /// Build an account view, deriving the remaining balance.
    pub fn new(owner_id: OwnerId, balance_total: i64, balance_used: i64) -> Self {
        Self {
            owner_id,
            balance_total,
            balance_used,
            balance_remaining: balance_total - balance_used,
        }
    }

    /// The zero account reported for owners who never received a grant.
    pub fn empty(owner_id: OwnerId) -> Self {
        Self::new(owner_id, 0, 0)
    }
}

/// Lifecycle of a per-job token reservation.
///
/// The reservation is the idempotency guard for settlement: a job's tokens
/// are released exactly once because only a `Reserved` row can be consumed
/// or refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Reserved,
    Consumed,
    Refunded,
}

impl ReservationState {
    /// Stable lowercase name, used for persistence and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ReservationState::Reserved => "reserved",
            ReservationState::Consumed => "consumed",
            ReservationState::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReservationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserved" => Ok(ReservationState::Reserved),
            "consumed" => Ok(ReservationState::Consumed),
            "refunded" => Ok(ReservationState::Refunded),
            other => Err(format!("Unknown reservation state '{other}'")),
        }
    }
}

/// A per-job token hold, keyed by job id.
#[derive(Debug, Clone, Serialize)]
pub struct Reservation {
    pub job_id: JobId,
    pub owner_id: OwnerId,
    pub amount: i64,
    pub state: ReservationState,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
