use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tokio::time::{interval, sleep};
use tokio_util::sync::CancellationToken;

use crate::engine::aggregator::StreamingAggregator;
use crate::engine::config::RunConfig;
use crate::engine::virtual_user::run_virtual_user;
use crate::error::ConvloadError;
use crate::http::{HttpClient, UserClient};
use crate::results::{RequestRecord, RunStatistics};
use crate::scenario::LoadScenario;

/// Listener fired once before any user is spawned.
pub type StartHook = Box<dyn Fn(&RunConfig) + Send + Sync>;

/// Listener fired once after every user has stopped, with the final statistics.
pub type StopHook = Box<dyn Fn(&RunConfig, &RunStatistics) + Send + Sync>;

type ScenarioFactory<S> = Arc<dyn Fn(usize) -> S + Send + Sync>;

/// A load test run: a scenario factory, run parameters and lifecycle
/// listeners.
///
/// Listeners are registered explicitly with [`TestRun::on_start`] and
/// [`TestRun::on_stop`] and run in registration order.
pub struct TestRun<S: LoadScenario> {
    config: RunConfig,
    factory: ScenarioFactory<S>,
    start_hooks: Vec<StartHook>,
    stop_hooks: Vec<StopHook>,
    cancel: CancellationToken,
}

impl<S: LoadScenario> TestRun<S> {
    /// `factory` is called with the user index to build each user's scenario.
    pub fn new(config: RunConfig, factory: impl Fn(usize) -> S + Send + Sync + 'static) -> Self {
        Self {
            config,
            factory: Arc::new(factory),
            start_hooks: Vec::new(),
            stop_hooks: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn on_start(mut self, hook: impl Fn(&RunConfig) + Send + Sync + 'static) -> Self {
        self.start_hooks.push(Box::new(hook));
        self
    }

    pub fn on_stop(
        mut self,
        hook: impl Fn(&RunConfig, &RunStatistics) + Send + Sync + 'static,
    ) -> Self {
        self.stop_hooks.push(Box::new(hook));
        self
    }

    /// Token that stops the run when cancelled. Tasks in flight get the
    /// configured stop timeout to finish.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the run to completion and return its statistics.
    ///
    /// The run ends when the configured run time elapses, on Ctrl-C, or when
    /// the [`TestRun::cancel_token`] is cancelled. A second Ctrl-C exits the
    /// process.
    pub async fn run(self) -> Result<RunStatistics, ConvloadError> {
        self.config.validate()?;

        let client = HttpClient::builder()
            .pool_max_idle_per_host(self.config.users.max(10))
            .build()?;

        let aggregator = Arc::new(RwLock::new(StreamingAggregator::new(
            self.config.host.clone(),
        )));
        let run_id = aggregator.read().await.run_id();
        let (verdict_tx, mut verdict_rx) = mpsc::unbounded_channel::<RequestRecord>();

        tracing::info!(
            %run_id,
            host = %self.config.host,
            users = self.config.users,
            spawn_rate = self.config.spawn_rate,
            "Starting load test run"
        );

        for hook in &self.start_hooks {
            hook(&self.config);
        }

        if let Some(run_time) = self.config.run_time {
            spawn_run_time_limit(run_time, self.cancel.clone());
        }
        let finished = CancellationToken::new();
        spawn_interrupt_listener(self.cancel.clone(), finished.clone());

        let progress_task = (!self.config.only_summary).then(|| {
            tokio::spawn(report_progress(
                Arc::clone(&aggregator),
                self.config.progress_interval,
                self.cancel.clone(),
            ))
        });

        let spawner = tokio::spawn(spawn_users(
            Arc::clone(&self.factory),
            self.config.clone(),
            client,
            verdict_tx,
            self.cancel.clone(),
        ));

        // Ends once every user and every outstanding response has dropped its
        // sender.
        while let Some(record) = verdict_rx.recv().await {
            aggregator.write().await.record(&record);
        }

        let spawn_result = spawner
            .await
            .map_err(|e| ConvloadError::Engine(format!("User spawner failed: {e}")));

        // Releases the run-time timer and the Ctrl-C listener.
        self.cancel.cancel();
        finished.cancel();
        if let Some(progress_task) = progress_task {
            progress_task.abort();
        }
        spawn_result?;

        let statistics = aggregator.read().await.statistics();
        tracing::info!(
            %run_id,
            requests = statistics.num_requests,
            failures = statistics.num_failures,
            duration_secs = statistics.duration_secs(),
            "Load test run finished"
        );

        for hook in &self.stop_hooks {
            hook(&self.config, &statistics);
        }

        Ok(statistics)
    }
}

// ---------------------------------------------------------------------------
// Internal implementation
// ---------------------------------------------------------------------------

/// Start `config.users` users, one every `1 / spawn_rate` seconds, then wait
/// for all of them to stop.
async fn spawn_users<S: LoadScenario>(
    factory: ScenarioFactory<S>,
    config: RunConfig,
    client: HttpClient,
    verdict_tx: mpsc::UnboundedSender<RequestRecord>,
    cancel: CancellationToken,
) {
    let spawn_interval = config.spawn_interval();
    let mut users: JoinSet<()> = JoinSet::new();

    for user_id in 0..config.users {
        if cancel.is_cancelled() {
            break;
        }

        if user_id > 0 {
            tokio::select! {
                _ = sleep(spawn_interval) => {}
                _ = cancel.cancelled() => break,
            }
        }

        let scenario = factory(user_id);
        let user_client = UserClient::new(
            user_id,
            config.host.clone(),
            client.clone(),
            verdict_tx.clone(),
        );
        users.spawn(run_virtual_user(
            scenario,
            user_client,
            cancel.clone(),
            config.stop_timeout,
        ));
    }

    if users.len() == config.users {
        tracing::info!("All {} users spawned", config.users);
    }

    // Only the users' clones keep the verdict channel open from here on.
    drop(verdict_tx);

    while let Some(joined) = users.join_next().await {
        if let Err(e) = joined {
            tracing::error!("User task failed: {e}");
        }
    }
}

fn spawn_run_time_limit(run_time: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = sleep(run_time) => {
                tracing::info!("Run time limit of {:?} reached, stopping", run_time);
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });
}

/// The first Ctrl-C stops the run gracefully; a second one while the run is
/// still winding down exits the process.
fn spawn_interrupt_listener(cancel: CancellationToken, finished: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => {
                    tracing::info!("Received Ctrl-C, stopping (press again to exit now)");
                    cancel.cancel();
                }
                Err(e) => {
                    tracing::warn!("Failed to listen for Ctrl-C: {e}");
                    return;
                }
            },
            _ = cancel.cancelled() => return,
        }

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if result.is_ok() {
                    tracing::warn!("Received second Ctrl-C, exiting");
                    std::process::exit(130);
                }
            }
            _ = finished.cancelled() => {}
        }
    });
}

/// Log a progress line every `every` until the run is cancelled.
async fn report_progress(
    aggregator: Arc<RwLock<StreamingAggregator>>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snap = aggregator.read().await.snapshot();
                tracing::info!(
                    "{} requests, {} failures, {:.2}ms mean, {:.2} req/s",
                    snap.total_requests,
                    snap.total_failures,
                    snap.mean_ms,
                    snap.current_rps,
                );
            }
            _ = cancel.cancelled() => break,
        }
    }
}
