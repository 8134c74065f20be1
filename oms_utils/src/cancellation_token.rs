use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::nothing_to_do;
use crate::OPERATION_CANCELED_MSG;

#[derive(Default)]
struct CancellationState {
    signal: Notify,
    handlers: Mutex<Vec<Box<dyn Fn() + Send>>>,
    is_cancellation_requested: AtomicBool,
}

/// Lightweight handle for signalling shutdown to dispatcher workers, the
/// reconciler loop and queue workers. Cheap to clone; pass by value.
#[derive(Default, Clone)]
pub struct CancellationToken {
    state: Arc<CancellationState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state
            .is_cancellation_requested
            .store(true, Ordering::SeqCst);
        self.state.handlers.lock().iter().for_each(|handler| handler());
        self.state.signal.notify_waiters();
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.state.is_cancellation_requested.load(Ordering::SeqCst)
    }

    pub fn error_if_cancellation_requested(&self) -> Result<()> {
        match self.is_cancellation_requested() {
            true => bail!(OPERATION_CANCELED_MSG),
            false => Ok(()),
        }
    }

    pub async fn when_cancelled(&self) {
        let action = async {
            if self.is_cancellation_requested() {
                return;
            }
            std::future::pending::<()>().await;
        };

        tokio::select! {
            _ = self.state.signal.notified() => nothing_to_do(),
            _ = action => nothing_to_do(),
        };
    }

    pub fn create_linked_token(&self) -> Self {
        let new_token = CancellationToken::new();

        {
            let weak = Arc::downgrade(&new_token.state);
            self.register_handler(Box::new(move || match weak.upgrade() {
                None => nothing_to_do(),
                Some(state) => CancellationToken { state }.cancel(),
            }));
        }

        if self.is_cancellation_requested() {
            new_token.cancel();
        }

        new_token
    }

    fn register_handler(&self, handler: Box<dyn Fn() + Send>) {
        self.state.handlers.lock().push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::CancellationToken;
    use std::time::Duration;

    #[test]
    fn just_cancel() {
        let token = CancellationToken::new();
        assert!(!token.is_cancellation_requested());
        token.cancel();
        assert!(token.is_cancellation_requested());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn single_await() {
        let token = CancellationToken::new();
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!token.is_cancellation_requested());

        token.cancel();
        token.when_cancelled().await;
        assert!(token.is_cancellation_requested());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_source_cancels_linked_token() {
        let source = CancellationToken::new();
        let linked = source.create_linked_token();
        assert!(!linked.is_cancellation_requested());

        source.cancel();
        assert!(linked.is_cancellation_requested());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelling_linked_token_does_not_cancel_source() {
        let source = CancellationToken::new();
        let linked = source.create_linked_token();

        linked.cancel();
        assert!(!source.is_cancellation_requested());
        assert!(linked.is_cancellation_requested());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn create_linked_token_when_source_already_cancelled() {
        let source = CancellationToken::new();
        source.cancel();

        let linked = source.create_linked_token();
        assert!(linked.is_cancellation_requested());
    }
}
