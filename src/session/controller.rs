//! Per-direction pipeline handles
//!
//! Each direction has its own slot behind its own lock, so a slow stop of
//! one pipeline never delays the other. Handle updates happen under that
//! lock together with the start/stop they belong to.

use crate::pipeline::{CancelFlag, Direction, PipelineReport, Termination};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0} already running")]
    AlreadyRunning(Direction),

    #[error("{0} not running")]
    NotRunning(Direction),

    #[error("Pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Liveness of one direction, derived from its task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Never started, or last run cancelled
    Stopped,
    /// Task alive
    Running,
    /// Last run reached the end of the broadcast
    Finished,
    /// Last run failed
    Error(String),
}

impl PipelineStatus {
    fn after(report: Option<&PipelineReport>) -> Self {
        match report.map(|r| &r.termination) {
            None | Some(Termination::Cancelled) => PipelineStatus::Stopped,
            Some(Termination::EndOfStream) => PipelineStatus::Finished,
            Some(Termination::Failed(reason)) => PipelineStatus::Error(reason.clone()),
        }
    }
}

struct PipelineHandle {
    cancel: CancelFlag,
    task: JoinHandle<PipelineReport>,
}

#[derive(Default)]
struct Slot {
    live: Option<PipelineHandle>,
    last: Option<PipelineReport>,
}

impl Slot {
    /// Collect a task that ended on its own
    async fn reap(&mut self) -> Result<(), SessionError> {
        if self.live.as_ref().is_some_and(|h| h.task.is_finished()) {
            if let Some(handle) = self.live.take() {
                let report = handle.task.await?;
                tracing::debug!("Reaped finished {} task", report.direction);
                self.last = Some(report);
            }
        }
        Ok(())
    }

    fn launch<F>(&mut self, direction: Direction, job: F)
    where
        F: FnOnce(CancelFlag) -> PipelineReport + Send + 'static,
    {
        let cancel = CancelFlag::new();
        let task_cancel = cancel.clone();
        let task = tokio::task::spawn_blocking(move || job(task_cancel));

        self.live = Some(PipelineHandle { cancel, task });
        self.last = None;
        tracing::info!("{} task started", direction);
    }

    /// Cancel a task taken out of this slot and wait for its report
    async fn halt(&mut self, handle: PipelineHandle) -> Result<PipelineReport, SessionError> {
        handle.cancel.cancel();
        let report = handle.task.await?;
        self.last = Some(report.clone());
        Ok(report)
    }
}

/// Owner of the send and receive pipeline handles
#[derive(Default)]
pub struct SessionController {
    send: Mutex<Slot>,
    receive: Mutex<Slot>,
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, direction: Direction) -> &Mutex<Slot> {
        match direction {
            Direction::Send => &self.send,
            Direction::Receive => &self.receive,
        }
    }

    /// Launch `job` on a blocking thread.
    ///
    /// Rejected while a previous run of the same direction is still alive.
    pub async fn start<F>(&self, direction: Direction, job: F) -> Result<(), SessionError>
    where
        F: FnOnce(CancelFlag) -> PipelineReport + Send + 'static,
    {
        let mut slot = self.slot(direction).lock().await;
        slot.reap().await?;
        if slot.live.is_some() {
            return Err(SessionError::AlreadyRunning(direction));
        }

        slot.launch(direction, job);
        Ok(())
    }

    /// Stop the direction if it is running, start `job` otherwise.
    ///
    /// Returns the stopped run's report, or `None` when a run was started.
    /// The choice and the action happen under one lock.
    pub async fn toggle<F>(
        &self,
        direction: Direction,
        job: F,
    ) -> Result<Option<PipelineReport>, SessionError>
    where
        F: FnOnce(CancelFlag) -> PipelineReport + Send + 'static,
    {
        let mut slot = self.slot(direction).lock().await;
        slot.reap().await?;
        if let Some(handle) = slot.live.take() {
            return slot.halt(handle).await.map(Some);
        }

        slot.launch(direction, job);
        Ok(None)
    }

    /// Cancel and wait for the pipeline; returns its report.
    ///
    /// A run that already ended on its own is reported as well.
    pub async fn stop(&self, direction: Direction) -> Result<PipelineReport, SessionError> {
        let mut slot = self.slot(direction).lock().await;
        let Some(handle) = slot.live.take() else {
            return Err(SessionError::NotRunning(direction));
        };
        slot.halt(handle).await
    }

    pub async fn status(&self, direction: Direction) -> PipelineStatus {
        let mut slot = self.slot(direction).lock().await;
        if let Err(e) = slot.reap().await {
            return PipelineStatus::Error(e.to_string());
        }
        if slot.live.is_some() {
            PipelineStatus::Running
        } else {
            PipelineStatus::after(slot.last.as_ref())
        }
    }

    pub async fn is_running(&self, direction: Direction) -> bool {
        self.status(direction).await == PipelineStatus::Running
    }

    /// Stop whatever is running in both directions
    pub async fn shutdown(&self) -> Vec<PipelineReport> {
        let mut reports = Vec::new();
        for direction in [Direction::Send, Direction::Receive] {
            match self.stop(direction).await {
                Ok(report) => reports.push(report),
                Err(SessionError::NotRunning(_)) => {}
                Err(e) => tracing::error!("Cannot stop {}: {}", direction, e),
            }
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn until_cancelled(direction: Direction) -> impl FnOnce(CancelFlag) -> PipelineReport + Send {
        move |cancel| {
            let mut report = PipelineReport::new(direction);
            while !cancel.is_cancelled() {
                report.chunks += 1;
                std::thread::sleep(Duration::from_millis(1));
            }
            report
        }
    }

    async fn wait_until_not_running(controller: &SessionController, direction: Direction) {
        for _ in 0..200 {
            if !controller.is_running(direction).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{} still running", direction);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let controller = SessionController::new();
        controller
            .start(Direction::Send, until_cancelled(Direction::Send))
            .await
            .unwrap();

        let again = controller
            .start(Direction::Send, until_cancelled(Direction::Send))
            .await;
        assert!(matches!(again, Err(SessionError::AlreadyRunning(Direction::Send))));

        let report = controller.stop(Direction::Send).await.unwrap();
        assert_eq!(report.termination, Termination::Cancelled);
        assert_eq!(controller.status(Direction::Send).await, PipelineStatus::Stopped);
    }

    #[tokio::test]
    async fn directions_are_independent() {
        let controller = SessionController::new();
        controller
            .start(Direction::Send, until_cancelled(Direction::Send))
            .await
            .unwrap();
        controller
            .start(Direction::Receive, until_cancelled(Direction::Receive))
            .await
            .unwrap();

        assert!(controller.is_running(Direction::Send).await);
        assert!(controller.is_running(Direction::Receive).await);

        let report = controller.stop(Direction::Receive).await.unwrap();
        assert_eq!(report.direction, Direction::Receive);
        assert!(controller.is_running(Direction::Send).await);

        let reports = controller.shutdown().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].direction, Direction::Send);
    }

    #[tokio::test]
    async fn stop_when_idle_is_rejected() {
        let controller = SessionController::new();
        let result = controller.stop(Direction::Receive).await;
        assert!(matches!(result, Err(SessionError::NotRunning(Direction::Receive))));
        assert!(controller.shutdown().await.is_empty());
    }

    #[tokio::test]
    async fn finished_run_is_reaped_and_reported() {
        let controller = SessionController::new();
        controller
            .start(Direction::Receive, |_| {
                let mut report = PipelineReport::new(Direction::Receive);
                report.termination = Termination::Failed("connection refused".into());
                report
            })
            .await
            .unwrap();

        wait_until_not_running(&controller, Direction::Receive).await;
        assert_eq!(
            controller.status(Direction::Receive).await,
            PipelineStatus::Error("connection refused".into())
        );

        // A dead handle does not block the next start
        controller
            .start(Direction::Receive, |_| {
                let mut report = PipelineReport::new(Direction::Receive);
                report.termination = Termination::EndOfStream;
                report
            })
            .await
            .unwrap();
        wait_until_not_running(&controller, Direction::Receive).await;
        assert_eq!(controller.status(Direction::Receive).await, PipelineStatus::Finished);
    }

    #[tokio::test]
    async fn concurrent_toggles_start_then_stop() {
        let controller = SessionController::new();
        let (first, second) = tokio::join!(
            controller.toggle(Direction::Send, until_cancelled(Direction::Send)),
            controller.toggle(Direction::Send, until_cancelled(Direction::Send)),
        );

        let outcomes = [first.unwrap(), second.unwrap()];
        assert_eq!(outcomes.iter().filter(|o| o.is_none()).count(), 1);
        let stopped: Vec<_> = outcomes.iter().flatten().collect();
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].termination, Termination::Cancelled);
        assert_eq!(controller.status(Direction::Send).await, PipelineStatus::Stopped);
    }
}
