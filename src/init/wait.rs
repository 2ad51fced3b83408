// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tower::BoxError;
use tracing::error;

/// Wait for the first task in the set to finish and surface its result.
pub async fn wait_for_any_task(tasks: &mut JoinSet<Result<(), BoxError>>) -> Result<(), BoxError> {
    match tasks.join_next().await {
        None => Ok(()), // empty set
        Some(res) => res?,
    }
}

/// Drain the task set under one shared deadline. The last error wins; join
/// failures are logged but do not replace a task's own error.
pub async fn wait_for_tasks_with_timeout(
    tasks: &mut JoinSet<Result<(), BoxError>>,
    timeout: Duration,
) -> Result<(), BoxError> {
    let stop_at = Instant::now() + timeout;
    let mut result = Ok(());

    loop {
        match timeout_at(stop_at, tasks.join_next()).await {
            Err(_) => return Err("timed out waiting for tasks to finish".into()),
            Ok(None) => return result,
            Ok(Some(Ok(Ok(())))) => {}
            Ok(Some(Ok(Err(e)))) => result = Err(e),
            Ok(Some(Err(e))) => error!(error = %e, "unable to join task"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_set_is_ok() {
        let mut tasks: JoinSet<Result<(), BoxError>> = JoinSet::new();
        assert!(wait_for_any_task(&mut tasks).await.is_ok());
        assert!(
            wait_for_tasks_with_timeout(&mut tasks, Duration::from_millis(10))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn task_error_is_surfaced() {
        let mut tasks: JoinSet<Result<(), BoxError>> = JoinSet::new();
        tasks.spawn(async { Err("boom".into()) });
        assert!(wait_for_any_task(&mut tasks).await.is_err());
    }

    #[tokio::test]
    async fn slow_task_times_out() {
        let mut tasks: JoinSet<Result<(), BoxError>> = JoinSet::new();
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let res = wait_for_tasks_with_timeout(&mut tasks, Duration::from_millis(50)).await;
        assert!(res.is_err());
        tasks.abort_all();
    }
}
