//! Terminal settlement: move a job to a failure state and give the tokens
//! back.
//!
//! Several paths race toward the same terminal write (permanent submit
//! errors, provider failure reports, the poll ceiling, user cancellation).
//! The status CAS picks one winner, and only the winner settles the ledger,
//! so the refund runs at most once per job no matter how many paths fire.
//!
//! A settlement is two writes with no transaction spanning them: the status
//! CAS, then the ledger flip. A crash between the two leaves a terminal job
//! with its reservation still open. The reconciler sweep finds those and
//! finishes the ledger side; every flip is state-guarded, so the sweep can
//! race the live paths without double-settling.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use atelier_core::status::JobStatus;
use atelier_store::models::job::{Job, TransitionChanges};
use atelier_store::{JobStore, LedgerError, StoreError, TokenLedger};

use crate::context::PipelineContext;
use crate::events::JobEvent;

/// Failure reason recorded when a job is cancelled on the owner's behalf.
pub const CANCEL_REASON: &str = "Cancelled by user";

/// Move `job` to `to` (`failed` or `expired`) and release its reservation.
///
/// Returns `Ok(true)` when this call performed the settlement, `Ok(false)`
/// when another path got there first.
pub async fn settle_failure(
    ctx: &PipelineContext,
    job: &Job,
    to: JobStatus,
    reason: &str,
) -> Result<bool, StoreError> {
    let changes = TransitionChanges {
        error_reason: Some(reason.to_string()),
        ..Default::default()
    };

    match ctx.jobs.transition(job.id, job.status, to, changes).await {
        Ok(_) => {}
        Err(StoreError::TransitionConflict { found, .. }) => {
            // Whoever won the CAS owns the settlement.
            tracing::debug!(job_id = %job.id, found = %found, "Lost settlement race");
            return Ok(false);
        }
        Err(err) => return Err(err),
    }

    release_reservation(ctx, job).await;

    let event = match to {
        JobStatus::Expired => JobEvent::Expired { job_id: job.id },
        _ => JobEvent::Failed {
            job_id: job.id,
            reason: reason.to_string(),
        },
    };
    ctx.bus.publish(event);

    tracing::info!(job_id = %job.id, status = %to, reason, "Job settled as failure");
    Ok(true)
}

/// Mark the reservation for a completed job as spent.
///
/// The deduction happened at reserve time, so this only flips the
/// reservation state; nothing here can take tokens twice.
pub async fn consume_reservation(ctx: &PipelineContext, job: &Job) {
    match ctx.ledger.consume(job.id).await {
        Ok(()) => {
            tracing::debug!(job_id = %job.id, amount = job.token_cost, "Reservation consumed");
        }
        Err(LedgerError::AlreadySettled { state, .. }) => {
            tracing::debug!(job_id = %job.id, state = %state, "Reservation already settled");
        }
        Err(err) => {
            tracing::error!(job_id = %job.id, error = %err, "Consume failed; reservation left open");
        }
    }
}

/// Release the token hold for a job, tolerating earlier settlement.
///
/// `AlreadySettled` means a concurrent path released or consumed the
/// reservation first; from this caller's point of view the work is done.
pub async fn release_reservation(ctx: &PipelineContext, job: &Job) {
    match ctx.ledger.refund(job.id).await {
        Ok(account) => {
            tracing::info!(
                job_id = %job.id,
                owner_id = job.owner_id,
                amount = job.token_cost,
                remaining = account.balance_remaining,
                "Refunded reservation"
            );
        }
        Err(LedgerError::AlreadySettled { state, .. }) => {
            tracing::debug!(job_id = %job.id, state = %state, "Reservation already settled");
        }
        Err(LedgerError::ReservationNotFound(_)) => {
            // Job creation failed after reserve was rolled back, or the
            // reservation was settled and pruned. Nothing to release.
            tracing::warn!(job_id = %job.id, "No reservation found to refund");
        }
        Err(err) => {
            tracing::error!(job_id = %job.id, error = %err, "Refund failed; reservation left open");
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Run the settlement reconciler loop until shutdown.
pub async fn run_reconciler(ctx: Arc<PipelineContext>, shutdown: CancellationToken) {
    tracing::info!(
        interval_secs = ctx.config.reconcile_interval.as_secs(),
        "Settlement reconciler started"
    );
    // The first tick fires immediately, doubling as startup recovery.
    let mut interval = tokio::time::interval(ctx.config.reconcile_interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Settlement reconciler stopping");
                break;
            }
            _ = interval.tick() => {
                match reconcile_reservations(&ctx).await {
                    Ok(0) => tracing::debug!("Reconcile pass: nothing open"),
                    Ok(settled) => {
                        tracing::info!(settled, "Reconcile pass settled stale reservations");
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "Reconcile pass failed");
                    }
                }
            }
        }
    }
}

/// One reconcile pass: finish the ledger side of any settlement that was
/// cut short between the terminal status write and the reservation flip.
///
/// Reservations whose job is still in flight are left alone. Returns the
/// number of reservations acted on.
pub async fn reconcile_reservations(ctx: &PipelineContext) -> Result<usize, LedgerError> {
    let open = ctx
        .ledger
        .open_reservations(ctx.config.scan_batch_size)
        .await?;

    let mut settled = 0;
    for reservation in open {
        let job = match ctx.jobs.find(reservation.job_id).await {
            Ok(job) => job,
            Err(err) => {
                tracing::error!(
                    job_id = %reservation.job_id,
                    error = %err,
                    "Reconcile lookup failed"
                );
                continue;
            }
        };

        match job {
            Some(job) if job.status == JobStatus::Completed => {
                tracing::warn!(
                    job_id = %job.id,
                    "Completed job still holds its reservation; consuming"
                );
                consume_reservation(ctx, &job).await;
                settled += 1;
            }
            Some(job) if job.status.is_terminal() => {
                tracing::warn!(
                    job_id = %job.id,
                    status = %job.status,
                    "Terminal job still holds its reservation; releasing"
                );
                release_reservation(ctx, &job).await;
                settled += 1;
            }
            // Pending or processing: the hold is doing its job.
            Some(_) => {}
            None => {
                // Creation failed after reserve and the rollback refund was
                // lost too. Give the tokens back.
                tracing::warn!(
                    job_id = %reservation.job_id,
                    "Reservation exists for a missing job; releasing"
                );
                match ctx.ledger.refund(reservation.job_id).await {
                    Ok(_) | Err(LedgerError::AlreadySettled { .. }) => settled += 1,
                    Err(err) => {
                        tracing::error!(
                            job_id = %reservation.job_id,
                            error = %err,
                            "Refund failed; reservation left open"
                        );
                    }
                }
            }
        }
    }
    Ok(settled)
}
