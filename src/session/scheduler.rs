use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::service::ImportService;

/// Whatever arranges for `step` to run again.
pub trait StepScheduler: Send + Sync {
    /// Requests one `step` after `delay`, replacing any pending request.
    fn schedule(&self, delay: Duration);

    /// Drops the pending request. A step already running is not affected.
    fn cancel(&self);
}

/// Timer-backed scheduler; the paired [`TimerDriver`] performs the steps.
pub struct TimerScheduler {
    deadline: watch::Sender<Option<Instant>>,
}

pub struct TimerDriver {
    deadline: watch::Receiver<Option<Instant>>,
}

impl TimerScheduler {
    pub fn new() -> (Self, TimerDriver) {
        let (tx, rx) = watch::channel(None);
        (Self { deadline: tx }, TimerDriver { deadline: rx })
    }
}

impl StepScheduler for TimerScheduler {
    fn schedule(&self, delay: Duration) {
        self.deadline.send_replace(Some(Instant::now() + delay));
    }

    fn cancel(&self) {
        self.deadline.send_replace(None);
    }
}

impl TimerDriver {
    /// Runs until the scheduler is dropped. A failed step is logged and not
    /// retried; the next trigger has to come from elsewhere.
    pub async fn run(mut self, service: Arc<ImportService>) {
        info!("step timer running");
        let mut fired: Option<Instant> = None;
        loop {
            let deadline = *self.deadline.borrow_and_update();
            match deadline {
                Some(at) if fired != Some(at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(at) => {
                            fired = Some(at);
                            debug!("timer firing step");
                            if let Err(err) = service.step_once().await {
                                warn!("scheduled step failed: {:#}", err);
                            }
                        }
                        changed = self.deadline.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                _ => {
                    if self.deadline.changed().await.is_err() {
                        break;
                    }
                }
            }
        }
        info!("step timer stopped");
    }
}

/// Scheduler for environments where a client drives every step.
pub struct ManualScheduler;

impl StepScheduler for ManualScheduler {
    fn schedule(&self, delay: Duration) {
        debug!(?delay, "next step left to the client");
    }

    fn cancel(&self) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Call {
        Schedule(Duration),
        Cancel,
    }

    /// Records scheduling requests instead of acting on them.
    #[derive(Default)]
    pub struct RecordingScheduler {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingScheduler {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn clear(&self) {
            self.calls.lock().unwrap().clear();
        }
    }

    impl StepScheduler for RecordingScheduler {
        fn schedule(&self, delay: Duration) {
            self.calls.lock().unwrap().push(Call::Schedule(delay));
        }

        fn cancel(&self) {
            self.calls.lock().unwrap().push(Call::Cancel);
        }
    }
}
