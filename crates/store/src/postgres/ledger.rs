//! PostgreSQL [`TokenLedger`].
//!
//! Reserve and refund are guarded UPDATEs inside a transaction: the balance
//! check and the mutation are one statement, so two racing requests cannot
//! both pass admission, and only the request that flips the reservation row
//! out of `reserved` touches the balance.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use atelier_core::types::{JobId, OwnerId, Timestamp};

use crate::error::LedgerError;
use crate::models::ledger::{LedgerAccount, Reservation, ReservationState};
use crate::postgres::is_unique_violation;
use crate::traits::TokenLedger;

/// Column list for `ledger_accounts` queries.
const ACCOUNT_COLUMNS: &str = "owner_id, balance_total, balance_used";

/// Column list for `token_reservations` queries.
const RESERVATION_COLUMNS: &str = "job_id, owner_id, amount, state, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct AccountRow {
    owner_id: i64,
    balance_total: i64,
    balance_used: i64,
}

impl AccountRow {
    fn into_account(self) -> LedgerAccount {
        LedgerAccount::new(self.owner_id, self.balance_total, self.balance_used)
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    job_id: Uuid,
    owner_id: i64,
    amount: i64,
    state: String,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl ReservationRow {
    fn into_reservation(self) -> Result<Reservation, LedgerError> {
        let state: ReservationState = self.state.parse().map_err(|_| {
            tracing::error!(
                job_id = %self.job_id,
                state = %self.state,
                "Unreadable reservation state"
            );
            LedgerError::Corrupt(self.owner_id)
        })?;
        Ok(Reservation {
            job_id: self.job_id,
            owner_id: self.owner_id,
            amount: self.amount,
            state,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Token accounting in the `ledger_accounts` and `token_reservations` tables.
pub struct PgTokenLedger {
    pool: PgPool,
}

impl PgTokenLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenLedger for PgTokenLedger {
    async fn grant(&self, owner_id: OwnerId, amount: i64) -> Result<LedgerAccount, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let query = format!(
            "INSERT INTO ledger_accounts (owner_id, balance_total, balance_used) \
             VALUES ($1, $2, 0) \
             ON CONFLICT (owner_id) DO UPDATE \
                 SET balance_total = ledger_accounts.balance_total + EXCLUDED.balance_total \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AccountRow>(&query)
            .bind(owner_id)
            .bind(amount)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into_account())
    }

    async fn balance(&self, owner_id: OwnerId) -> Result<LedgerAccount, LedgerError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM ledger_accounts WHERE owner_id = $1");
        let row = sqlx::query_as::<_, AccountRow>(&query)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map_or_else(
            || LedgerAccount::empty(owner_id),
            AccountRow::into_account,
        ))
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
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "UPDATE ledger_accounts \
             SET balance_used = balance_used + $2 \
             WHERE owner_id = $1 AND balance_total - balance_used >= $2 \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, AccountRow>(&query)
            .bind(owner_id)
            .bind(amount)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(account) = updated else {
            tx.rollback().await?;
            let remaining = self.balance(owner_id).await?.balance_remaining;
            return Err(LedgerError::InsufficientTokens {
                needed: amount,
                remaining,
            });
        };

        let inserted = sqlx::query(
            "INSERT INTO token_reservations (job_id, owner_id, amount, state) \
             VALUES ($1, $2, $3, 'reserved')",
        )
        .bind(job_id)
        .bind(owner_id)
        .bind(amount)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            tx.rollback().await?;
            if is_unique_violation(&e) {
                return Err(LedgerError::DuplicateReservation(job_id));
            }
            return Err(e.into());
        }

        tx.commit().await?;
        Ok(account.into_account())
    }

    async fn consume(&self, job_id: JobId) -> Result<(), LedgerError> {
        let result = sqlx::query(
            "UPDATE token_reservations \
             SET state = 'consumed', updated_at = NOW() \
             WHERE job_id = $1 AND state = 'reserved'",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let existing = self
                .reservation(job_id)
                .await?
                .ok_or(LedgerError::ReservationNotFound(job_id))?;
            return Err(LedgerError::AlreadySettled {
                job_id,
                state: existing.state,
            });
        }
        Ok(())
    }

    async fn refund(&self, job_id: JobId) -> Result<LedgerAccount, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "UPDATE token_reservations \
             SET state = 'refunded', updated_at = NOW() \
             WHERE job_id = $1 AND state = 'reserved' \
             RETURNING {RESERVATION_COLUMNS}"
        );
        let settled = sqlx::query_as::<_, ReservationRow>(&query)
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(reservation) = settled else {
            tx.rollback().await?;
            let existing = self
                .reservation(job_id)
                .await?
                .ok_or(LedgerError::ReservationNotFound(job_id))?;
            return Err(LedgerError::AlreadySettled {
                job_id,
                state: existing.state,
            });
        };

        let query = format!(
            "UPDATE ledger_accounts \
             SET balance_used = balance_used - $2 \
             WHERE owner_id = $1 AND balance_used >= $2 \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let account = sqlx::query_as::<_, AccountRow>(&query)
            .bind(reservation.owner_id)
            .bind(reservation.amount)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(account) = account else {
            tx.rollback().await?;
            tracing::error!(
                owner_id = reservation.owner_id,
                amount = reservation.amount,
                "Refund would drive ledger negative"
            );
            return Err(LedgerError::Corrupt(reservation.owner_id));
        };

        tx.commit().await?;
        Ok(account.into_account())
    }

    async fn reservation(&self, job_id: JobId) -> Result<Option<Reservation>, LedgerError> {
        let query = format!(
            "SELECT {RESERVATION_COLUMNS} FROM token_reservations WHERE job_id = $1"
        );
        let row = sqlx::query_as::<_, ReservationRow>(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ReservationRow::into_reservation).transpose()
    }

    async fn open_reservations(&self, limit: i64) -> Result<Vec<Reservation>, LedgerError> {
        let query = format!(
            "SELECT {RESERVATION_COLUMNS} FROM token_reservations \
             WHERE state = 'reserved' \
             ORDER BY created_at ASC \
             LIMIT $1"
        );
        let rows = sqlx::query_as::<_, ReservationRow>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(ReservationRow::into_reservation)
            .collect()
    }
}
