//! Background execution of workflows.
//!
//! [`SessionRunner::launch`] starts a workflow on a tokio task and returns
//! at once with a [`WorkflowHandle`]. The handle yields the run's status
//! events in emission order followed by exactly one
//! [`RunnerEvent::Finished`]. While a workflow is in flight every further
//! launch is refused with [`RunnerError::Busy`], so at most one session to
//! the device exists at any time.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_core::Stream;
use log::{debug, warn};
use tokio::sync::mpsc;

use crate::classify::{ErrorKind, Failure};
use crate::error::RunnerError;
use crate::workflow::{Engine, Slot, StatusEvent, Workflow, WorkflowResult};

/// What a [`WorkflowHandle`] yields.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    Status(StatusEvent),
    /// Always the last event of a run.
    Finished(WorkflowResult),
}

/// Launches workflows one at a time.
#[derive(Debug, Clone)]
pub struct SessionRunner {
    engine: Arc<Engine>,
    in_flight: Arc<Mutex<Option<Slot>>>,
}

impl SessionRunner {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(engine),
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The slot currently running, if any.
    pub fn running(&self) -> Option<Slot> {
        *lock(&self.in_flight)
    }

    /// Start `workflow` in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn launch(&self, workflow: Workflow) -> Result<WorkflowHandle, RunnerError> {
        let slot = workflow.slot();
        {
            let mut gate = lock(&self.in_flight);
            if let Some(running) = *gate {
                debug!("refusing {}: {} in flight", slot, running);
                return Err(RunnerError::Busy { running });
            }
            *gate = Some(slot);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Arc::clone(&self.engine);
        let gate = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            let status_tx = tx.clone();
            let sink = move |event: StatusEvent| {
                // A dropped handle only means nobody is watching
                let _ = status_tx.send(RunnerEvent::Status(event));
            };

            // Run on its own task so a panic still produces a result
            let run = tokio::spawn(async move { engine.run(workflow, &sink).await });
            let result = match run.await {
                Ok(result) => result,
                Err(e) => {
                    warn!("{} task ended abnormally: {}", slot, e);
                    let failure = Failure::new(
                        ErrorKind::Unknown,
                        format!("{} Error: unexpected failure ({})", slot, e),
                    );
                    let _ = tx.send(RunnerEvent::Status(StatusEvent::new(
                        failure.message.clone(),
                    )));
                    WorkflowResult::Failed(failure)
                }
            };

            *lock(&gate) = None;
            let _ = tx.send(RunnerEvent::Finished(result));
        });

        Ok(WorkflowHandle { slot, events: rx })
    }
}

fn lock(gate: &Mutex<Option<Slot>>) -> MutexGuard<'_, Option<Slot>> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The caller's end of a launched workflow.
#[derive(Debug)]
pub struct WorkflowHandle {
    slot: Slot,
    events: mpsc::UnboundedReceiver<RunnerEvent>,
}

impl WorkflowHandle {
    pub fn slot(&self) -> Slot {
        self.slot
    }

    /// Next event, or `None` once the run is over and drained.
    pub async fn next_event(&mut self) -> Option<RunnerEvent> {
        self.events.recv().await
    }

    /// Drive the run to its result, handing each status event to
    /// `on_status` as it arrives.
    pub async fn finish(mut self, mut on_status: impl FnMut(StatusEvent)) -> WorkflowResult {
        while let Some(event) = self.events.recv().await {
            match event {
                RunnerEvent::Status(status) => on_status(status),
                RunnerEvent::Finished(result) => return result,
            }
        }
        WorkflowResult::Failed(Failure::new(
            ErrorKind::Unknown,
            format!("{} Error: run ended without a result", self.slot),
        ))
    }
}

impl Stream for WorkflowHandle {
    type Item = RunnerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RunnerEvent>> {
        self.events.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_util::StreamExt;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::config::WorkflowSettings;
    use crate::profile::DeviceProfile;
    use crate::transport::TransportKind;
    use crate::transport::simulated::SimulatedDevice;

    fn runner(device: &SimulatedDevice) -> SessionRunner {
        SessionRunner::new(Engine::new(
            Arc::new(device.clone()),
            WorkflowSettings::default(),
        ))
    }

    fn verify(kind: TransportKind) -> Workflow {
        let address = match kind {
            TransportKind::Console => "COM3",
            _ => "10.0.0.1",
        };
        Workflow::Verify(
            DeviceProfile::builder(kind, address)
                .username("admin")
                .password("cisco")
                .build()
                .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_is_last_event() {
        let device = SimulatedDevice::new();
        let handle = runner(&device).launch(verify(TransportKind::Ssh)).unwrap();
        assert_eq!(handle.slot(), Slot::Verify);

        let events: Vec<RunnerEvent> = handle.collect().await;
        let finished = events
            .iter()
            .filter(|e| matches!(e, RunnerEvent::Finished(_)))
            .count();
        assert_eq!(finished, 1);
        match events.last() {
            Some(RunnerEvent::Finished(result)) => assert!(result.verified().is_some()),
            other => panic!("unexpected last event {:?}", other),
        }
        assert!(matches!(
            &events[0],
            RunnerEvent::Status(s) if s.text().starts_with("Verifying")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_launch_refused_while_running() {
        let device = SimulatedDevice::new();
        let runner = runner(&device);

        let first = assert_ok!(runner.launch(verify(TransportKind::Console)));
        assert_eq!(runner.running(), Some(Slot::Verify));
        let busy = assert_err!(runner.launch(verify(TransportKind::Console)));
        assert_eq!(
            busy,
            RunnerError::Busy {
                running: Slot::Verify
            }
        );
        assert_err!(runner.launch(Workflow::Backup { device: None }));

        let mut seen = Vec::new();
        let result = first.finish(|e| seen.push(e.into_text())).await;
        assert!(result.is_success());
        assert_eq!(seen.last().unwrap(), "Credentials Verified on Console!");
        assert_eq!(runner.running(), None);

        assert_eq!(device.connects(), 1);
        assert_eq!(device.max_concurrent(), 1);

        // Gate is open again once the result is out
        let again = assert_ok!(runner.launch(verify(TransportKind::Console)));
        assert!(again.finish(|_| {}).await.is_success());
        assert_eq!(device.max_concurrent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_arrives_as_result() {
        let device = SimulatedDevice::new();
        let handle = runner(&device)
            .launch(Workflow::Zeroize { device: None })
            .unwrap();

        let mut seen = Vec::new();
        let result = handle.finish(|e| seen.push(e.into_text())).await;
        assert_eq!(result.failure().unwrap().kind, ErrorKind::InvalidInput);
        assert_eq!(
            seen,
            vec![
                "Enter Credentials on Router Info tab.",
                "Once entered click Verify."
            ]
        );
    }
}
