use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::http::UserClient;
use crate::scenario::LoadScenario;

/// Run a single simulated user: call the scenario's task in a loop until
/// `cancel` is triggered.
///
/// A task still in flight when `cancel` fires gets `stop_timeout` to finish
/// before it is dropped along with its request.
pub async fn run_virtual_user<S: LoadScenario>(
    scenario: S,
    client: UserClient,
    cancel: CancellationToken,
    stop_timeout: Duration,
) {
    let wait_time = scenario.wait_time();
    tracing::debug!(user = client.user_id(), "Starting user running {}", scenario.name());

    loop {
        if cancel.is_cancelled() {
            break;
        }

        tokio::select! {
            result = scenario.run_task(&client) => {
                if let Err(e) = result {
                    // The failure itself has already been recorded by the client.
                    tracing::debug!(user = client.user_id(), "Task ended early: {e}");
                }
            }
            _ = stop_deadline(&cancel, stop_timeout) => {
                tracing::debug!(user = client.user_id(), "Abandoning task still in flight at stop");
                break;
            }
        }

        if wait_time.is_zero() {
            // Back-to-back tasks; yield so a task that never awaits cannot
            // starve the other users on this worker.
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = sleep(wait_time) => {}
                _ = cancel.cancelled() => break,
            }
        }
    }

    tracing::debug!(user = client.user_id(), "User stopped");
}

async fn stop_deadline(cancel: &CancellationToken, stop_timeout: Duration) {
    cancel.cancelled().await;
    if !stop_timeout.is_zero() {
        sleep(stop_timeout).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvloadError;
    use crate::http::HttpClient;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc::unbounded_channel;

    struct CountingScenario {
        calls: Arc<AtomicUsize>,
        stop_after: usize,
        cancel: CancellationToken,
        wait: Duration,
    }

    #[async_trait]
    impl LoadScenario for CountingScenario {
        fn name(&self) -> &str {
            "counting"
        }

        fn wait_time(&self) -> Duration {
            self.wait
        }

        async fn run_task(&self, _client: &UserClient) -> Result<(), ConvloadError> {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if calls >= self.stop_after {
                self.cancel.cancel();
            }
            if calls % 2 == 0 {
                return Err(ConvloadError::Engine("even iteration".to_string()));
            }
            Ok(())
        }
    }

    fn user_client() -> UserClient {
        let (tx, _rx) = unbounded_channel();
        let client = HttpClient::builder().build().expect("client builds");
        UserClient::new(0, "http://localhost:8080", client, tx)
    }

    #[tokio::test]
    async fn loops_until_cancelled_and_survives_task_errors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let scenario = CountingScenario {
            calls: calls.clone(),
            stop_after: 5,
            cancel: cancel.clone(),
            wait: Duration::ZERO,
        };

        run_virtual_user(scenario, user_client(), cancel, Duration::ZERO).await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn already_cancelled_user_runs_no_task() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let scenario = CountingScenario {
            calls: calls.clone(),
            stop_after: usize::MAX,
            cancel: cancel.clone(),
            wait: Duration::ZERO,
        };

        run_virtual_user(scenario, user_client(), cancel, Duration::ZERO).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_interrupts_wait_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let scenario = CountingScenario {
            calls: calls.clone(),
            stop_after: usize::MAX,
            cancel: cancel.clone(),
            wait: Duration::from_secs(3600),
        };

        let canceller = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            run_virtual_user(scenario, user_client(), cancel, Duration::ZERO),
        )
        .await
        .expect("user stops during its wait");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// A task that takes `duration` and counts how often it got to finish.
    struct SlowScenario {
        duration: Duration,
        finished: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LoadScenario for SlowScenario {
        fn name(&self) -> &str {
            "slow"
        }

        async fn run_task(&self, _client: &UserClient) -> Result<(), ConvloadError> {
            sleep(self.duration).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn stalled_task_is_abandoned_at_stop() {
        let finished = Arc::new(AtomicUsize::new(0));
        let scenario = SlowScenario {
            duration: Duration::from_secs(3600),
            finished: finished.clone(),
        };
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            run_virtual_user(scenario, user_client(), cancel, Duration::ZERO),
        )
        .await
        .expect("user stops while its task is stalled");

        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn in_flight_task_finishes_within_stop_timeout() {
        let finished = Arc::new(AtomicUsize::new(0));
        let scenario = SlowScenario {
            duration: Duration::from_millis(200),
            finished: finished.clone(),
        };
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            run_virtual_user(scenario, user_client(), cancel, Duration::from_secs(2)),
        )
        .await
        .expect("user stops after its task finishes");

        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
