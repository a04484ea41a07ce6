use std::sync::Mutex;

use tokio::sync::Notify;

use crate::error::CaptureError;

/// One-shot hand-off gate between the orchestration task and the browser
/// event loop.
///
/// A gate starts closed; waiters park until some other task opens it,
/// optionally attaching an error that every waiter then observes. Opening
/// is idempotent and permanent, which is what guarantees that a stopped
/// pipeline can always wake anything parked in a gate.
#[derive(Debug, Default)]
pub struct Gate {
    state: Mutex<GateState>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    error: Option<CaptureError>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the gate with a success result. No-op if already open.
    pub fn open(&self) {
        let mut state = self.state.lock().unwrap();
        if state.open {
            return;
        }
        state.open = true;
        drop(state);
        self.notify.notify_waiters();
    }

    /// Opens the gate with an error every waiter will receive.
    pub fn fail(&self, error: CaptureError) {
        let mut state = self.state.lock().unwrap();
        if state.open {
            return;
        }
        state.open = true;
        state.error = Some(error);
        drop(state);
        self.notify.notify_waiters();
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    /// Parks until the gate opens, returning the attached error if any.
    pub async fn wait(&self) -> Result<(), CaptureError> {
        loop {
            // The notified future must exist before the state check so an
            // open() racing between the two cannot be missed.
            let notified = self.notify.notified();
            {
                let state = self.state.lock().unwrap();
                if state.open {
                    return match &state.error {
                        Some(err) => Err(err.clone()),
                        None => Ok(()),
                    };
                }
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_before_wait() {
        let gate = Gate::new();
        gate.open();
        assert!(gate.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_open() {
        let gate = Arc::new(Gate::new());
        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.open();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_fail_delivers_error_to_all_waiters() {
        let gate = Arc::new(Gate::new());
        let mut waiters = Vec::new();
        for _ in 0..3 {
            let gate = Arc::clone(&gate);
            waiters.push(tokio::spawn(async move { gate.wait().await }));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.fail(CaptureError::Cancelled);
        for waiter in waiters {
            let result = waiter.await.unwrap();
            assert!(matches!(result, Err(CaptureError::Cancelled)));
        }
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let gate = Gate::new();
        gate.open();
        gate.open();
        // A later fail must not overwrite a successful open.
        gate.fail(CaptureError::Cancelled);
        assert!(gate.wait().await.is_ok());
    }
}
