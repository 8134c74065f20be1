use anyhow::Result;
use std::fmt::{Arguments, Debug, Display};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::cancellation_token::CancellationToken;
use crate::logger::print_info;
use crate::OPERATION_CANCELED_MSG;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CompletionReason {
    CompletedSuccessfully,
    Canceled,
    Error,
    Panicked,
}

/// Spawn a supervised background task (dispatcher worker loop, queue worker,
/// reconciler tick) with logging, panic containment and cooperative
/// cancellation via `cancellation_token`. Prefer this to a bare `tokio::spawn`
/// for anything that runs for the lifetime of the process: a panic inside
/// `action` is caught and logged instead of silently dropping the task.
pub fn spawn_supervised(
    task_name: &str,
    action: impl Future<Output = Result<()>> + Send + 'static,
    cancellation_token: CancellationToken,
) -> JoinHandle<CompletionReason> {
    let task_name = task_name.to_owned();
    let task_id = Uuid::new_v4();
    log::info!("task '{task_name}' ({task_id}) started");

    tokio::spawn(async move {
        let log_template = format!("task '{task_name}' ({task_id})");
        let inner = tokio::spawn(action);

        tokio::select! {
            joined = inner => match joined {
                Ok(Ok(())) => {
                    log::trace!("{log_template} completed");
                    CompletionReason::CompletedSuccessfully
                }
                Ok(Err(error)) => {
                    if error.to_string() == OPERATION_CANCELED_MSG {
                        log::trace!("{log_template} cancelled via Result<()>");
                        return CompletionReason::Canceled;
                    }
                    log::error!("{log_template} returned error: {error:?}");
                    CompletionReason::Error
                }
                Err(join_error) => {
                    log::error!("{log_template} panicked: {join_error}");
                    CompletionReason::Panicked
                }
            },
            _ = cancellation_token.when_cancelled() => {
                print_info(format!("{log_template} stopped by cancellation token"));
                CompletionReason::Canceled
            }
        }
    })
}

pub async fn with_timeout<T, Fut>(timeout: Duration, fut: Fut) -> Option<T>
where
    Fut: Future<Output = T>,
{
    tokio::select! {
        result = fut => Some(result),
        _ = tokio::time::sleep(timeout) => None,
    }
}

pub trait WithExpect<T> {
    /// Unwrap the value or panic with additional context, evaluated lazily.
    fn with_expect<C>(self, f: impl FnOnce() -> C) -> T
    where
        C: Display + Send + Sync + 'static;

    fn with_expect_args(self, f: impl FnOnce(&dyn Fn(&Arguments))) -> T;
}

impl<T> WithExpect<T> for Option<T> {
    fn with_expect<C>(self, f: impl FnOnce() -> C) -> T
    where
        C: Display + Send + 'static,
    {
        self.unwrap_or_else(|| panic!("{}", f()))
    }

    fn with_expect_args(self, f: impl FnOnce(&dyn Fn(&Arguments))) -> T {
        self.unwrap_or_else(|| {
            f(&|args| panic!("{args}"));
            unreachable!()
        })
    }
}

impl<T, E> WithExpect<T> for std::result::Result<T, E>
where
    E: Debug,
{
    fn with_expect<C>(self, f: impl FnOnce() -> C) -> T
    where
        C: Display + Send + Sync + 'static,
    {
        match self {
            Ok(v) => v,
            Err(e) => panic!("{}: {:?}", f(), e),
        }
    }

    fn with_expect_args(self, f: impl FnOnce(&dyn Fn(&Arguments))) -> T {
        match self {
            Ok(v) => v,
            Err(e) => {
                f(&|args| panic!("{args}: {e:?}"));
                unreachable!()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[tokio::test]
    async fn completes_successfully() {
        let outcome = spawn_supervised("test_task", async { Ok(()) }, CancellationToken::default())
            .await
            .unwrap();
        assert_eq!(outcome, CompletionReason::CompletedSuccessfully);
    }

    #[tokio::test]
    async fn reports_error() {
        let outcome = spawn_supervised(
            "test_task",
            async { bail!("boom") },
            CancellationToken::default(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, CompletionReason::Error);
    }

    #[tokio::test]
    async fn reports_panic() {
        let outcome = spawn_supervised(
            "test_task",
            async {
                panic!("kaboom");
            },
            CancellationToken::default(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, CompletionReason::Panicked);
    }

    #[tokio::test]
    async fn stops_on_cancellation() {
        let token = CancellationToken::new();
        let linked = token.clone();
        let handle = spawn_supervised(
            "test_task",
            async move {
                std::future::pending::<()>().await;
                unreachable!()
            },
            linked,
        );
        token.cancel();
        let outcome = handle.await.unwrap();
        assert_eq!(outcome, CompletionReason::Canceled);
    }

    #[tokio::test]
    async fn with_timeout_returns_none_on_expiry() {
        let out = with_timeout(Duration::from_millis(10), std::future::pending::<()>()).await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn with_timeout_returns_some_on_completion() {
        let out = with_timeout(Duration::from_secs(5), async { 42 }).await;
        assert_eq!(out, Some(42));
    }
}
