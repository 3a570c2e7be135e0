//! The workload: nested observation trees on threads and tasks.
//!
//! A root `bench.run` observation is made current on the driver, captured
//! once, and handed to every worker. Thread workers apply the snapshot
//! around their whole run; task workers go through [`ContextExecutor`], so
//! the snapshot is applied on every poll. Each tree a worker builds must
//! adopt `bench.run` as its root's parent and leave `bench.run` current
//! when it finishes.

use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Context as _, Result};
use futures::future::join_all;
use serde::Serialize;
use sightline::handler::logging::LoggingHandler;
use sightline::handler::metrics::MeterHandler;
use sightline::handler::span::TracingSpanHandler;
use sightline::propagation::ContextExecutor;
use sightline::{
    Context, ContextRegistry, ContextSnapshot, KeyValue, Observation, ObservationHandler,
    ObservationRegistry, ObservationThreadLocalAccessor,
};

use crate::config::{Config, HandlerKind};

/// Accepts every context and does nothing.
struct NullHandler;

impl ObservationHandler for NullHandler {
    fn supports_context(&self, _context: &Context) -> bool {
        true
    }
}

/// Outcome of one worker.
#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    observations: u64,
    /// Trees whose root was not parented to `bench.run`, or that left
    /// something other than `bench.run` current.
    misparented: u64,
    /// Whether the worker's thread had no current observation afterwards.
    clean: bool,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub handlers: Vec<String>,
    pub threads: usize,
    pub tasks: usize,
    pub iterations: usize,
    pub depth: usize,
    pub observations: u64,
    pub elapsed_secs: f64,
    pub observations_per_sec: f64,
    pub misparented: u64,
    pub leaked_workers: usize,
}

impl Report {
    /// Whether every worker finished with consistent context.
    pub fn is_consistent(&self) -> bool {
        self.misparented == 0 && self.leaked_workers == 0
    }
}

/// Build an observation registry with the requested handlers.
pub fn build_registry(handlers: &[HandlerKind]) -> ObservationRegistry {
    let registry = ObservationRegistry::create();
    for kind in handlers {
        let editor = registry.observation_config();
        match kind {
            HandlerKind::Logging => editor.observation_handler(LoggingHandler::new()),
            HandlerKind::Tracing => editor.observation_handler(TracingSpanHandler::new()),
            HandlerKind::Metrics => editor.observation_handler(MeterHandler::global()),
            HandlerKind::None => editor.observation_handler(NullHandler),
        };
    }
    registry
}

/// Run the configured workload and report throughput.
pub async fn run(config: &Config) -> Result<Report> {
    let registry = build_registry(&config.handlers);
    let contexts = ContextRegistry::new();
    contexts.register_thread_local_accessor(ObservationThreadLocalAccessor::with_registry(
        registry.clone(),
    ));

    let root = Observation::create_started("bench.run", &registry);
    let snapshot = root
        .scoped(|| ContextSnapshot::capture_all(&contexts))
        .context("failed to capture the run context")?;

    tracing::info!(
        threads = config.threads,
        tasks = config.tasks,
        iterations = config.iterations,
        depth = config.depth,
        "Starting workload"
    );
    let started = Instant::now();

    let threads: Vec<_> = (0..config.threads)
        .map(|_| spawn_thread_worker(&registry, &root, snapshot.clone(), config))
        .collect();

    let executor = ContextExecutor::new(move || snapshot.clone());
    let tasks: Vec<_> = (0..config.tasks)
        .map(|_| {
            let registry = registry.clone();
            let root = root.clone();
            let (iterations, depth) = (config.iterations, config.depth);
            executor.spawn(async move {
                let mut stats = WorkerStats::default();
                for _ in 0..iterations {
                    run_tree(&registry, &root, "task", depth, &mut stats);
                    tokio::task::yield_now().await;
                }
                stats
            })
        })
        .collect();

    let mut all = Vec::with_capacity(config.threads + config.tasks);
    for joined in join_all(tasks).await {
        let mut stats = joined.context("task worker failed")??;
        // The executor reverts after every poll; only the driver is checked.
        stats.clean = true;
        all.push(stats);
    }

    let thread_stats = tokio::task::spawn_blocking(move || {
        threads
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| anyhow!("thread worker panicked"))
                    .and_then(|stats| stats)
            })
            .collect::<Result<Vec<_>>>()
    })
    .await
    .context("thread join failed")??;
    all.extend(thread_stats);

    let elapsed = started.elapsed().as_secs_f64();
    root.stop();

    let driver_clean = registry.current_observation().is_none();
    let observations: u64 = all.iter().map(|s| s.observations).sum::<u64>() + 1;
    let report = Report {
        handlers: config.handlers.iter().map(|h| format!("{:?}", h).to_lowercase()).collect(),
        threads: config.threads,
        tasks: config.tasks,
        iterations: config.iterations,
        depth: config.depth,
        observations,
        elapsed_secs: elapsed,
        observations_per_sec: if elapsed > 0.0 {
            observations as f64 / elapsed
        } else {
            0.0
        },
        misparented: all.iter().map(|s| s.misparented).sum(),
        leaked_workers: all.iter().filter(|s| !s.clean).count() + usize::from(!driver_clean),
    };

    tracing::info!(
        observations = report.observations,
        elapsed_secs = report.elapsed_secs,
        consistent = report.is_consistent(),
        "Workload finished"
    );
    Ok(report)
}

fn spawn_thread_worker(
    registry: &ObservationRegistry,
    root: &Observation,
    snapshot: ContextSnapshot,
    config: &Config,
) -> thread::JoinHandle<Result<WorkerStats>> {
    let registry = registry.clone();
    let root = root.clone();
    let (iterations, depth) = (config.iterations, config.depth);

    thread::spawn(move || {
        let worker_registry = registry.clone();
        let mut stats = snapshot
            .wrap(move || {
                let mut stats = WorkerStats::default();
                for _ in 0..iterations {
                    run_tree(&worker_registry, &root, "thread", depth, &mut stats);
                }
                stats
            })()
            .context("failed to apply the run context")?;
        stats.clean = registry.current_observation().is_none();
        Ok(stats)
    })
}

/// Build one tree and check that it was parented and balanced.
fn run_tree(
    registry: &ObservationRegistry,
    root: &Observation,
    worker: &'static str,
    depth: usize,
    stats: &mut WorkerStats,
) {
    let (count, parent) = observe_level(registry, worker, 0, depth);
    stats.observations += count;

    let parented = depth == 0 || parent.as_ref() == Some(root);
    let balanced = registry.current_observation().as_ref() == Some(root);
    if !(parented && balanced) {
        stats.misparented += 1;
    }
}

/// Observe `level` and everything below it. Returns the number of
/// observations and the parent of the observation at `level`.
fn observe_level(
    registry: &ObservationRegistry,
    worker: &'static str,
    level: usize,
    depth: usize,
) -> (u64, Option<Observation>) {
    if level >= depth {
        return (0, None);
    }

    let observation = Observation::create_not_started(format!("bench.level.{}", level), registry)
        .low_cardinality_key_value(KeyValue::new("worker", worker));
    let handle = observation.clone();
    let below = observation.observe(|| observe_level(registry, worker, level + 1, depth).0);
    (below + 1, handle.parent())
}
