//! Concurrent closed loop: engine, analyzer, and planner on independent
//! schedules.
//!
//! The engine task owns the world and is the only writer. External
//! mutations reach it as commands on an `mpsc` channel and are served
//! between tick passes, so a mutation never interleaves with a counter
//! pass. Telemetry leaves through a bounded channel; the analyzer polls
//! the store and hands its newest result to the planner over a `watch`
//! channel, where a newer message replaces one not yet planned.
//!
//! Decisions travel back tagged with the tick they were planned from and
//! are applied as one command. The engine drops a plan whose tick is no
//! longer its latest, so a plan either lands before the next counter pass
//! or not at all.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::config::ScenarioConfig;
use crate::error::{CommandError, MutationError, TransportError};
use crate::messages::{AssignDemand, DecisionMessage, MarkActive, TelemetryFrame};
use crate::sim::analyzer::{Analysis, EligibilityAnalyzer};
use crate::sim::engine::Engine;
use crate::sim::planner::Planner;
use crate::sim::types::DispatchReport;
use crate::transport::retry::{RetryPolicy, retry};
use crate::transport::{DecisionSink, SnapshotSource, TelemetrySink};

const COMMAND_BUFFER: usize = 64;

/// A request served by the engine task between ticks.
#[derive(Debug)]
pub enum EngineCommand {
    AssignDemand {
        request: AssignDemand,
        reply: oneshot::Sender<Result<(), MutationError>>,
    },
    MarkActive {
        request: MarkActive,
        reply: oneshot::Sender<Result<(), MutationError>>,
    },
    ApplyDecisions {
        tick: u64,
        decisions: DecisionMessage,
        reply: oneshot::Sender<DispatchReport>,
    },
}

/// Cloneable sender side of the engine's command channel.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub fn new(tx: mpsc::Sender<EngineCommand>) -> Self {
        Self { tx }
    }

    /// Opens a demand on an idle consumer.
    ///
    /// # Errors
    ///
    /// `Rejected` if the consumer is not idle or unknown, `Transport` if
    /// the engine task is gone.
    pub async fn assign_demand(&self, request: AssignDemand) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::AssignDemand { request, reply }, rx)
            .await
    }

    /// Starts a pending consumer.
    ///
    /// # Errors
    ///
    /// `Rejected` if the consumer is not pending or unknown, `Transport` if
    /// the engine task is gone.
    pub async fn mark_active(&self, request: MarkActive) -> Result<(), CommandError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::MarkActive { request, reply }, rx)
            .await
    }

    /// Applies a plan computed from snapshot tick `tick` in one step.
    ///
    /// # Errors
    ///
    /// `Closed` if the engine task is gone. A plan for a superseded tick is
    /// not an error; it comes back counted as `stale`.
    pub async fn apply_decisions(
        &self,
        tick: u64,
        decisions: DecisionMessage,
    ) -> Result<DispatchReport, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::ApplyDecisions {
                tick,
                decisions,
                reply,
            })
            .await
            .map_err(|_| TransportError::Closed("engine command"))?;
        rx.await.map_err(|_| TransportError::Closed("engine reply"))
    }

    async fn send(
        &self,
        command: EngineCommand,
        rx: oneshot::Receiver<Result<(), MutationError>>,
    ) -> Result<(), CommandError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| TransportError::Closed("engine command"))?;
        let result = rx
            .await
            .map_err(|_| TransportError::Closed("engine reply"))?;
        Ok(result?)
    }
}

/// Actuation boundary that applies decisions to the running engine.
///
/// The whole plan goes to the engine as one command, tagged with its tick.
/// There `activate` marks the consumer active and `deactivate` is logged as
/// an explicit denial that leaves the consumer pending.
#[derive(Debug, Clone)]
pub struct EngineActuator {
    engine: EngineHandle,
}

impl EngineActuator {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

impl DecisionSink for EngineActuator {
    async fn dispatch(
        &self,
        tick: u64,
        decisions: &DecisionMessage,
    ) -> Result<DispatchReport, TransportError> {
        self.engine.apply_decisions(tick, decisions.clone()).await
    }
}

fn serve_command(engine: &mut Engine, command: EngineCommand) {
    let delivered = match command {
        EngineCommand::AssignDemand { request, reply } => {
            reply.send(engine.assign_demand(&request)).is_ok()
        }
        EngineCommand::MarkActive { request, reply } => {
            reply.send(engine.mark_active(&request)).is_ok()
        }
        EngineCommand::ApplyDecisions {
            tick,
            decisions,
            reply,
        } => reply.send(engine.apply_decisions(tick, &decisions)).is_ok(),
    };
    if !delivered {
        debug!("command caller went away before the reply");
    }
}

/// Engine loop: ticks on `period` and serves commands in between.
///
/// Returns the engine when `shutdown` flips or its sender is dropped.
pub async fn run_engine(
    mut engine: Engine,
    period: Duration,
    mut commands: mpsc::Receiver<EngineCommand>,
    frames: mpsc::Sender<TelemetryFrame>,
    mut shutdown: watch::Receiver<bool>,
) -> Engine {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            Some(command) = commands.recv() => serve_command(&mut engine, command),
            _ = ticker.tick() => {
                let report = engine.step();
                debug!(%report, "tick");
                match frames.try_send(engine.frame()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(frame)) => {
                        warn!(tick = frame.tick, "telemetry backlog full; frame dropped");
                    }
                    Err(TrySendError::Closed(frame)) => {
                        warn!(tick = frame.tick, "telemetry channel closed; frame dropped");
                    }
                }
            }
        }
    }
    info!(ticks = engine.ticks_run(), "engine stopped");
    engine
}

/// Drains engine frames into a telemetry sink.
///
/// After each successful publish the frame's tick is announced on
/// `published`, so the analyzer can read it without waiting for its timer.
pub async fn run_publisher<S: TelemetrySink>(
    sink: Arc<S>,
    mut frames: mpsc::Receiver<TelemetryFrame>,
    policy: RetryPolicy,
    published: watch::Sender<Option<u64>>,
) {
    while let Some(frame) = frames.recv().await {
        let tick = frame.tick;
        let result = retry(&policy, "telemetry publish", || sink.publish(frame.clone())).await;
        match result {
            Ok(()) => {
                published.send_replace(Some(tick));
            }
            Err(err) => warn!(tick, error = %err, "telemetry frame dropped"),
        }
    }
}

/// Analyzer loop: analyzes each newly published tick, and polls the
/// snapshot source every `period` as a fallback.
///
/// Snapshot versions already analyzed are skipped. Messages with nothing
/// eligible are not published.
pub async fn run_analyzer<S: SnapshotSource>(
    analyzer: EligibilityAnalyzer,
    source: Arc<S>,
    period: Duration,
    policy: RetryPolicy,
    mut published: watch::Receiver<Option<u64>>,
    out: watch::Sender<Option<Analysis>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_tick: Option<u64> = None;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            Ok(()) = published.changed() => {}
            _ = ticker.tick() => {}
        }
        let analysis = match analyzer.poll(source.as_ref(), &policy).await {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!(error = %err, "analysis skipped this period");
                continue;
            }
        };
        if last_tick == Some(analysis.tick) {
            continue;
        }
        last_tick = Some(analysis.tick);
        if analysis.eligibility.is_empty() {
            debug!(tick = analysis.tick, "nothing eligible");
            continue;
        }
        if out.send(Some(analysis)).is_err() {
            break;
        }
    }
}

/// Planner loop: allocates each new eligibility message and dispatches the
/// decisions with bounded retries.
///
/// Decisions that still fail after the last retry are logged as dropped,
/// as are plans the engine refuses because a newer tick has run. The next
/// analysis supersedes them.
pub async fn run_planner<P: Planner, D: DecisionSink>(
    planner: P,
    sink: Arc<D>,
    mut eligibility: watch::Receiver<Option<Analysis>>,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            changed = eligibility.changed() => {
                if changed.is_err() {
                    break;
                }
                let Some(analysis) = eligibility.borrow_and_update().clone() else {
                    continue;
                };
                let decisions = planner.plan(&analysis.eligibility);
                if decisions.is_empty() {
                    continue;
                }
                let tick = analysis.tick;
                let result =
                    retry(&policy, "decision dispatch", || sink.dispatch(tick, &decisions)).await;
                match result {
                    Ok(report) if report.stale > 0 => {
                        info!(tick, stale = report.stale, "plan outlived its tick; dropped");
                    }
                    Ok(report) => debug!(tick, ?report, "decisions dispatched"),
                    Err(err) => {
                        for (member_id, d) in decisions.iter() {
                            warn!(
                                tick,
                                member = member_id,
                                consumer = %d.consumer_id,
                                action = ?d.action,
                                reason = %err,
                                "decision dropped"
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Timing and retry settings of a live pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub tick_period: Duration,
    pub poll_period: Duration,
    pub urgency_threshold_s: u64,
    pub retry: RetryPolicy,
    /// Frames buffered between the engine and the publisher.
    pub frame_buffer: usize,
}

impl PipelineSettings {
    pub fn from_scenario(scenario: &ScenarioConfig) -> Self {
        Self {
            tick_period: Duration::from_millis(scenario.simulation.real_tick_ms),
            poll_period: Duration::from_millis(scenario.analyzer.poll_ms),
            urgency_threshold_s: scenario.analyzer.urgency_threshold_s,
            retry: scenario.transport.retry_policy(),
            frame_buffer: 16,
        }
    }
}

/// Running pipeline tasks.
pub struct Pipeline {
    handle: EngineHandle,
    shutdown: watch::Sender<bool>,
    engine_task: JoinHandle<Engine>,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawns the engine, publisher, analyzer, and planner tasks.
    ///
    /// Telemetry goes to `store`, which also serves the analyzer's
    /// snapshots. Decisions are applied to the engine through an
    /// [`EngineActuator`]. Must be called within a tokio runtime.
    pub fn spawn<S, P>(engine: Engine, store: Arc<S>, planner: P, settings: PipelineSettings) -> Self
    where
        S: TelemetrySink + SnapshotSource,
        P: Planner + Send + 'static,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (frame_tx, frame_rx) = mpsc::channel(settings.frame_buffer.max(1));
        let (eligibility_tx, eligibility_rx) = watch::channel(None);
        let (published_tx, published_rx) = watch::channel(None);
        let handle = EngineHandle::new(command_tx);

        let engine_task = tokio::spawn(run_engine(
            engine,
            settings.tick_period,
            command_rx,
            frame_tx,
            shutdown_rx.clone(),
        ));
        let tasks = vec![
            tokio::spawn(run_publisher(
                Arc::clone(&store),
                frame_rx,
                settings.retry,
                published_tx,
            )),
            tokio::spawn(run_analyzer(
                EligibilityAnalyzer::new(settings.urgency_threshold_s),
                store,
                settings.poll_period,
                settings.retry,
                published_rx,
                eligibility_tx,
                shutdown_rx.clone(),
            )),
            tokio::spawn(run_planner(
                planner,
                Arc::new(EngineActuator::new(handle.clone())),
                eligibility_rx,
                settings.retry,
                shutdown_rx,
            )),
        ];
        info!(
            tick_ms = settings.tick_period.as_millis() as u64,
            poll_ms = settings.poll_period.as_millis() as u64,
            "pipeline started"
        );

        Self {
            handle,
            shutdown,
            engine_task,
            tasks,
        }
    }

    /// Handle for external mutation requests.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Signals every task to stop and returns the final engine.
    ///
    /// # Errors
    ///
    /// Returns the `JoinError` if the engine task panicked.
    pub async fn shutdown(self) -> Result<Engine, JoinError> {
        // receivers may already be gone; nothing to signal then
        let _ = self.shutdown.send(true);
        let engine = self.engine_task.await?;
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "pipeline task failed");
            }
        }
        Ok(engine)
    }
}
