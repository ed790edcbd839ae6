//! Background task lifecycle: start the dispatch workers, the poller, and
//! the settlement reconciler, stop them cleanly.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::PipelineContext;
use crate::{compensation, dispatcher, poller};

/// Handle to the running pipeline tasks.
pub struct PipelineRuntime {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineRuntime {
    /// Spawn the worker pool, the poll loop, and the reconciler.
    pub fn start(ctx: Arc<PipelineContext>) -> Self {
        let shutdown = CancellationToken::new();
        let mut tasks = Vec::with_capacity(ctx.config.worker_count + 2);

        // Worker names carry a per-process nonce so a lease taken before a
        // restart never looks like it belongs to the new process.
        let process = uuid::Uuid::new_v4().simple().to_string();
        for index in 0..ctx.config.worker_count {
            let worker = format!("worker-{}-{index}", &process[..8]);
            tasks.push(tokio::spawn(dispatcher::run(
                ctx.clone(),
                worker,
                shutdown.child_token(),
            )));
        }
        tasks.push(tokio::spawn(poller::run(ctx.clone(), shutdown.child_token())));
        tasks.push(tokio::spawn(compensation::run_reconciler(
            ctx.clone(),
            shutdown.child_token(),
        )));

        tracing::info!(workers = ctx.config.worker_count, "Pipeline runtime started");
        Self { shutdown, tasks }
    }

    /// Signal every task to stop and wait for them to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "Pipeline task panicked");
            }
        }
        tracing::info!("Pipeline runtime stopped");
    }
}
