use futures::channel::oneshot;

use crate::domain::logging::{LogComponent, get_logger};

/// Stop signal for one running connection task.
///
/// Closing is idempotent: only the first call reaches the task, later calls
/// (and the drop of the handle) are no-ops. A task that ended on its own
/// drops its receiver, which makes the handle report closed.
pub struct SourceHandle {
    stop: Option<oneshot::Sender<()>>,
    endpoint: String,
}

impl SourceHandle {
    pub fn new(endpoint: impl Into<String>) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { stop: Some(tx), endpoint: endpoint.into() }, rx)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        self.stop.as_ref().is_none_or(|tx| tx.is_canceled())
    }

    /// Returns `true` only for the call that actually signalled the task.
    pub fn close(&mut self) -> bool {
        match self.stop.take() {
            Some(tx) => match tx.send(()) {
                Ok(()) => true,
                Err(()) => {
                    get_logger().debug(
                        LogComponent::Infrastructure("SourceHandle"),
                        &format!("Reader for {} had already finished", self.endpoint),
                    );
                    false
                }
            },
            None => false,
        }
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_signals_exactly_once() {
        let (mut handle, mut rx) = SourceHandle::new("ws://localhost:9000");
        assert!(handle.close());
        assert!(!handle.close());
        assert!(handle.is_closed());
        assert_eq!(rx.try_recv(), Ok(Some(())));
    }

    #[test]
    fn finished_task_leaves_the_handle_closed() {
        let (mut handle, rx) = SourceHandle::new("ws://localhost:9000");
        assert!(!handle.is_closed());
        drop(rx);
        assert!(handle.is_closed());
        assert!(!handle.close());
    }

    #[test]
    fn dropping_handle_stops_the_task() {
        let (handle, mut rx) = SourceHandle::new("ws://localhost:9000");
        drop(handle);
        assert_eq!(rx.try_recv(), Ok(Some(())));
    }
}
