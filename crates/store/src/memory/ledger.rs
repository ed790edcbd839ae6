//! In-memory [`TokenLedger`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use atelier_core::types::{JobId, OwnerId};

use crate::error::LedgerError;
use crate::models::ledger::{LedgerAccount, Reservation, ReservationState};
use crate::traits::TokenLedger;

#[derive(Default)]
struct AccountState {
    total: i64,
    used: i64,
}

#[derive(Default)]
struct LedgerInner {
    accounts: HashMap<OwnerId, AccountState>,
    reservations: HashMap<JobId, Reservation>,
}

/// Token accounting in a mutex-guarded map. The single lock serializes all
/// mutations, which is exactly the per-owner atomicity the trait promises.
#[derive(Default)]
pub struct MemoryTokenLedger {
    inner: Mutex<LedgerInner>,
}

impl MemoryTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenLedger for MemoryTokenLedger {
    async fn grant(&self, owner_id: OwnerId, amount: i64) -> Result<LedgerAccount, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut inner = self.inner.lock().await;
        let account = inner.accounts.entry(owner_id).or_default();
        account.total += amount;
        Ok(LedgerAccount::new(owner_id, account.total, account.used))
    }

    async fn balance(&self, owner_id: OwnerId) -> Result<LedgerAccount, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(match inner.accounts.get(&owner_id) {
            Some(account) => LedgerAccount::new(owner_id, account.total, account.used),
            None => LedgerAccount::empty(owner_id),
        })
    }

    async fn reserve(
        &self,
        owner_id: OwnerId,
        job_id: JobId,
        amount: i64,
    ) -> Result<LedgerAccount, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut inner = self.inner.lock().await;
        if inner.reservations.contains_key(&job_id) {
            return Err(LedgerError::DuplicateReservation(job_id));
        }

        let account = inner.accounts.entry(owner_id).or_default();
        let remaining = account.total - account.used;
        if remaining < amount {
            return Err(LedgerError::InsufficientTokens {
                needed: amount,
                remaining,
            });
        }
        account.used += amount;
        let view = LedgerAccount::new(owner_id, account.total, account.used);

        let now = Utc::now();
        inner.reservations.insert(
            job_id,
            Reservation {
                job_id,
                owner_id,
                amount,
                state: ReservationState::Reserved,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(view)
    }

    async fn consume(&self, job_id: JobId) -> Result<(), LedgerError> {
        let mut inner = self.inner.lock().await;
        let reservation = inner
            .reservations
            .get_mut(&job_id)
            .ok_or(LedgerError::ReservationNotFound(job_id))?;
        if reservation.state != ReservationState::Reserved {
            return Err(LedgerError::AlreadySettled {
                job_id,
                state: reservation.state,
            });
        }
        reservation.state = ReservationState::Consumed;
        reservation.updated_at = Utc::now();
        Ok(())
    }

    async fn refund(&self, job_id: JobId) -> Result<LedgerAccount, LedgerError> {
        let mut inner = self.inner.lock().await;
        let reservation = inner
            .reservations
            .get(&job_id)
            .ok_or(LedgerError::ReservationNotFound(job_id))?;
        if reservation.state != ReservationState::Reserved {
            return Err(LedgerError::AlreadySettled {
                job_id,
                state: reservation.state,
            });
        }
        let owner_id = reservation.owner_id;
        let amount = reservation.amount;

        let account = inner
            .accounts
            .get_mut(&owner_id)
            .ok_or(LedgerError::Corrupt(owner_id))?;
        if account.used < amount {
            tracing::error!(owner_id, amount, used = account.used, "Refund would drive ledger negative");
            return Err(LedgerError::Corrupt(owner_id));
        }
        account.used -= amount;
        let view = LedgerAccount::new(owner_id, account.total, account.used);

        let reservation = inner
            .reservations
            .get_mut(&job_id)
            .ok_or(LedgerError::ReservationNotFound(job_id))?;
        reservation.state = ReservationState::Refunded;
        reservation.updated_at = Utc::now();
        Ok(view)
    }

    async fn reservation(&self, job_id: JobId) -> Result<Option<Reservation>, LedgerError> {
        Ok(self.inner.lock().await.reservations.get(&job_id).cloned())
    }

    async fn open_reservations(&self, limit: i64) -> Result<Vec<Reservation>, LedgerError> {
        let inner = self.inner.lock().await;
        let mut open: Vec<Reservation> = inner
            .reservations
            .values()
            .filter(|r| r.state == ReservationState::Reserved)
            .cloned()
            .collect();
        open.sort_by_key(|r| r.created_at);
        open.truncate(limit.max(0) as usize);
        Ok(open)
    }
}
