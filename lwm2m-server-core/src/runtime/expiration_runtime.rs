//! Runtime helper for the periodic registration expiration sweep.

use crate::control_plane::RegistrationLifecycle;
use crate::observability::events;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const COMPONENT: &str = "expiration_runtime";

/// Handle of a running sweep task. Dropping it leaves the task running; call
/// [`ExpirationTask::stop`] to end it.
pub(crate) struct ExpirationTask {
    shutdown: Option<oneshot::Sender<()>>,
    join_handle: JoinHandle<()>,
}

impl ExpirationTask {
    /// Stops the sweep and waits for the task to finish its current pass.
    pub(crate) async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = (&mut self.join_handle).await {
            warn!(
                event = events::EXPIRATION_TASK_STOPPED,
                component = COMPONENT,
                err = %err,
                "expiration task ended abnormally"
            );
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }
}

/// Spawns a task removing expired registrations every `interval`.
///
/// The first sweep runs one full interval after the call.
pub(crate) fn spawn_expiration_sweep(
    lifecycle: Arc<RegistrationLifecycle>,
    interval: Duration,
) -> ExpirationTask {
    let (shutdown, mut shutdown_rx) = oneshot::channel();
    let join_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => sweep_once(&lifecycle).await,
            }
        }

        info!(
            event = events::EXPIRATION_TASK_STOPPED,
            component = COMPONENT,
            "expiration task stopped"
        );
    });

    ExpirationTask {
        shutdown: Some(shutdown),
        join_handle,
    }
}

async fn sweep_once(lifecycle: &RegistrationLifecycle) {
    debug!(
        event = events::EXPIRATION_SWEEP_START,
        component = COMPONENT,
        "expiration sweep started"
    );
    match lifecycle.expire(Utc::now()).await {
        Ok(removed) => debug!(
            event = events::EXPIRATION_SWEEP_OK,
            component = COMPONENT,
            removed = removed.len(),
            "expiration sweep done"
        ),
        // The next tick retries.
        Err(err) => warn!(
            event = events::EXPIRATION_SWEEP_FAILED,
            component = COMPONENT,
            err = %err,
            "expiration sweep failed"
        ),
    }
}
