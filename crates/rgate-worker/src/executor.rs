//! Job executor.
//!
//! A single worker drains the queue: at most one render runs per gateway.
//! Each job goes validate -> route -> (export | fetch -> compile -> run ->
//! store) and always ends in exactly one terminal update.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn, Instrument, Span};

use rgate_media::{compile, CommandExecutor, CompiledCommand, EventSink, MediaError, RunEvent, RunOptions};
use rgate_models::{
    route, validate_plan, ApiErrorBody, EngineId, ExecutionPlan, Job, JobArtifacts, JobId, RenderOutput,
    RoutingDecision,
};
use rgate_queue::{ClaimedJob, JobOutcome, JobUpdate, QueueError, QueueHandle};
use rgate_storage::{ErrorStage, LocalStore};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::error_handler::{Decision, ErrorContext, ErrorHandler};
use crate::fetch::SourceFetcher;
use crate::logging::JobLogger;

/// Time allowed for queued progress events to drain after the process exits.
const EVENT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Everything the executor talks to.
pub struct ExecutorDeps {
    pub queue: QueueHandle,
    pub runner: Arc<dyn CommandExecutor>,
    pub fetcher: SourceFetcher,
    pub outputs: LocalStore,
    pub errors: ErrorHandler,
    /// Usable engines in priority order
    pub engines: Vec<EngineId>,
}

/// Job executor that renders queued jobs one at a time.
pub struct JobExecutor {
    config: WorkerConfig,
    deps: ExecutorDeps,
    shutdown: watch::Sender<bool>,
}

/// Per-job state threaded through the stages.
struct JobRun<'a> {
    job: &'a Job,
    logger: JobLogger,
    work_dir: PathBuf,
}

impl JobRun<'_> {
    fn ctx(&self, stage: ErrorStage, attempt: u32) -> ErrorContext<'_> {
        ErrorContext {
            job_id: &self.job.id,
            project_id: self.job.project_id.as_deref(),
            stage,
            attempt,
        }
    }
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, deps: ExecutorDeps) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { config, deps, shutdown }
    }

    /// Stop claiming jobs and kill the active render, if any.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Drain the queue until shutdown or until the queue stops.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            engines = ?self.deps.engines,
            work_dir = %self.config.work_dir.display(),
            "Starting job executor"
        );
        tokio::fs::create_dir_all(&self.config.work_dir).await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            if *shutdown_rx.borrow_and_update() {
                info!("Shutdown signal received, stopping executor");
                break;
            }

            let claimed = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                claimed = self.deps.queue.claim() => claimed,
            };

            match claimed {
                Ok(claimed) => {
                    self.process(claimed).await;
                }
                Err(QueueError::ActorGone) => {
                    info!("Job queue stopped, executor exiting");
                    break;
                }
                Err(e) => {
                    error!("Error claiming job: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Render one claimed job and resolve it. Returns the terminal record.
    pub async fn process(&self, claimed: ClaimedJob) -> Option<Job> {
        let ClaimedJob { job, plan, output_name } = claimed;
        let logger = JobLogger::new(&job);
        let span = logger.span();
        let run = JobRun {
            job: &job,
            logger,
            work_dir: self.config.work_dir.join(job.id.as_str()),
        };

        async {
            run.logger.claimed();
            let started = Instant::now();

            let outcome = match self.render(&run, &plan, output_name.as_deref(), started).await {
                Ok(outcome) => outcome,
                Err(error) => JobOutcome::Failed(error),
            };

            if let Err(e) = tokio::fs::remove_dir_all(&run.work_dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    run.logger.cleanup_failed(e);
                }
            }

            let status = match &outcome {
                JobOutcome::Done(_) => "done",
                JobOutcome::Failed(_) => "error",
                JobOutcome::Partial(_) => "partial_success",
            };
            metrics::histogram!("rgate_render_duration_seconds", "status" => status)
                .record(started.elapsed().as_secs_f64());

            match self.deps.queue.finish(&job.id, outcome).await {
                Ok(finished) => {
                    run.logger.finished(&finished);
                    Some(finished)
                }
                Err(e) => {
                    run.logger.record_failed(e);
                    None
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn render(
        &self,
        run: &JobRun<'_>,
        plan: &ExecutionPlan,
        output_name: Option<&str>,
        started: Instant,
    ) -> Result<JobOutcome, ApiErrorBody> {
        if let Err(e) = validate_plan(plan) {
            return Err(self.abort(run, ErrorStage::Plan, e.into()).await);
        }

        let decision = route(plan, &self.deps.engines);
        Span::current().record("engine", decision.selected.as_str());
        run.logger.routed(&decision);
        self.note(
            &run.job.id,
            format!(
                "Routed to {} ({} engine(s) rejected)",
                decision.selected,
                decision.fallback_chain.len()
            ),
        )
        .await;
        self.update(&run.job.id, JobUpdate::Route(decision.clone())).await;

        let mut plan = plan.clone();
        if plan.output_format.quality.is_none() {
            plan.output_format.quality = Some(self.config.default_quality);
        }
        let file_name = output_file_name(output_name, &run.job.id, &plan);

        match decision.selected {
            EngineId::PlanExport => self.export(run, plan, decision, &file_name).await,
            EngineId::ServerFfmpeg => self.render_ffmpeg(run, plan, &file_name, started).await,
            other => Err(self
                .abort(run, ErrorStage::Plan, MediaError::UnsupportedEngine(other).into())
                .await),
        }
    }

    /// No renderer qualified: hand back the compiled command and plan.
    async fn export(
        &self,
        run: &JobRun<'_>,
        plan: ExecutionPlan,
        decision: RoutingDecision,
        file_name: &str,
    ) -> Result<JobOutcome, ApiErrorBody> {
        let compiled = match compile(&plan, EngineId::PlanExport, file_name) {
            Ok(compiled) => compiled,
            Err(e) => return Err(self.abort(run, ErrorStage::Plan, e.into()).await),
        };
        run.logger.exported();

        Ok(JobOutcome::Partial(Box::new(JobArtifacts {
            engine: EngineId::PlanExport,
            fallback_chain: decision.fallback_chain,
            command: compiled.program,
            args: compiled.args,
            plan,
        })))
    }

    async fn render_ffmpeg(
        &self,
        run: &JobRun<'_>,
        plan: ExecutionPlan,
        file_name: &str,
        started: Instant,
    ) -> Result<JobOutcome, ApiErrorBody> {
        let inputs = self.localize_sources(run, &plan).await?;
        let local_plan = plan.localized(&inputs);

        let output_path = run.work_dir.join(format!("output.{}", plan.output_format.container.extension()));
        let compiled = match compile(&local_plan, EngineId::ServerFfmpeg, &output_path.to_string_lossy()) {
            Ok(compiled) => compiled,
            Err(e) => return Err(self.abort(run, ErrorStage::Plan, e.into()).await),
        };
        debug!("Compiled command: {}", compiled.command_line());

        if let Err(e) = self.execute(run, &compiled, plan.output_duration_ms()).await {
            return Err(self.abort(run, ErrorStage::Encode, e.into()).await);
        }

        let stored = match self
            .deps
            .outputs
            .import_file(&output_path, file_name, plan.output_format.container.mime_type())
            .await
        {
            Ok(stored) => stored,
            Err(e) => return Err(self.abort(run, ErrorStage::Store, e.into()).await),
        };

        Ok(JobOutcome::Done(RenderOutput {
            output_url: stored.public_url,
            output_size: stored.size,
            duration_ms: started.elapsed().as_millis() as u64,
        }))
    }

    /// Pin every distinct asset to a local file, retrying transient failures.
    async fn localize_sources(
        &self,
        run: &JobRun<'_>,
        plan: &ExecutionPlan,
    ) -> Result<HashMap<String, String>, ApiErrorBody> {
        let inputs_dir = run.work_dir.join("inputs");
        let mut paths = HashMap::new();

        for (index, url) in plan.asset_urls().into_iter().enumerate() {
            let mut attempt = 1;
            let path = loop {
                let error = match self.deps.fetcher.localize(&url, &inputs_dir, index).await {
                    Ok(path) => break path,
                    Err(e) => e,
                };

                let handled = self.deps.errors.handle(&error, run.ctx(ErrorStage::Fetch, attempt)).await;
                let Decision::Retry { delay } = handled.decision else {
                    return Err(handled.body());
                };

                self.note(
                    &run.job.id,
                    format!(
                        "Fetch attempt {} for {} failed ({}), retrying in {}ms",
                        attempt,
                        url,
                        handled.record.message,
                        delay.as_millis()
                    ),
                )
                .await;
                if !self.sleep_unless_shutdown(delay).await {
                    return Err(self.abort(run, ErrorStage::Fetch, MediaError::Cancelled.into()).await);
                }
                attempt += 1;
            };

            paths.insert(url, path_string(&path));
        }

        Ok(paths)
    }

    /// Run the compiled command, streaming progress and logs into the job.
    async fn execute(&self, run: &JobRun<'_>, compiled: &CompiledCommand, output_duration_ms: i64) -> WorkerResult<()> {
        tokio::fs::create_dir_all(&run.work_dir).await?;

        let timeout = self.config.render_timeout(output_duration_ms);
        let options = RunOptions {
            timeout: Some(timeout),
            cancel: Some(self.shutdown.subscribe()),
            tail_lines: self.config.logs_tail_lines,
        };
        run.logger.encoding(compiled.input_count(), timeout);

        let (tx, rx) = mpsc::unbounded_channel::<RunEvent>();
        let sink: EventSink = Arc::new(move |event: RunEvent| {
            let _ = tx.send(event);
        });
        let forwarder = tokio::spawn(forward_events(
            self.deps.queue.clone(),
            run.job.id.clone(),
            rx,
            compiled.total_duration_ms,
            self.config.logs_tail_lines,
        ));

        let result = self.deps.runner.run(compiled, options, sink).await;

        if tokio::time::timeout(EVENT_DRAIN_GRACE, forwarder).await.is_err() {
            warn!(job_id = %run.job.id, "Progress forwarder did not drain in time");
        }

        let outcome = result?;
        run.logger.encoded(outcome.elapsed);
        Ok(())
    }

    async fn abort(&self, run: &JobRun<'_>, stage: ErrorStage, error: WorkerError) -> ApiErrorBody {
        self.deps.errors.handle(&error, run.ctx(stage, 1)).await.body()
    }

    /// Append a worker-side line to the job's log tail.
    async fn note(&self, job_id: &JobId, line: String) {
        self.update(
            job_id,
            JobUpdate::Logs {
                lines: vec![line],
                keep: self.config.logs_tail_lines,
            },
        )
        .await;
    }

    async fn update(&self, job_id: &JobId, update: JobUpdate) {
        if let Err(e) = self.deps.queue.update(job_id, update).await {
            warn!(job_id = %job_id, "Failed to update job: {}", e);
        }
    }

    /// Sleep for `delay`; false when shutdown arrived first.
    async fn sleep_unless_shutdown(&self, delay: Duration) -> bool {
        let mut shutdown_rx = self.shutdown.subscribe();
        if *shutdown_rx.borrow_and_update() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown_rx.changed() => false,
        }
    }
}

async fn forward_events(
    queue: QueueHandle,
    job_id: JobId,
    mut rx: mpsc::UnboundedReceiver<RunEvent>,
    total_duration_ms: i64,
    keep: usize,
) {
    let mut last_pct = 0u8;
    while let Some(event) = rx.recv().await {
        let update = match event {
            RunEvent::Progress(progress) => {
                let pct = progress.percent(total_duration_ms);
                if pct <= last_pct {
                    continue;
                }
                last_pct = pct;
                JobUpdate::Progress(pct)
            }
            RunEvent::Log(line) => JobUpdate::Logs { lines: vec![line], keep },
        };
        if queue.update(&job_id, update).await.is_err() {
            break;
        }
    }
}

/// `{name}-{job_id}.{ext}` from the requested name, or `{job_id}.{ext}`
/// without one. The job id keeps outputs of same-named jobs apart.
pub fn output_file_name(requested: Option<&str>, job_id: &JobId, plan: &ExecutionPlan) -> String {
    let ext = plan.output_format.container.extension();
    let base = requested
        .map(|name| {
            let name = name.trim();
            let name = name
                .strip_suffix(&format!(".{}", ext))
                .unwrap_or(name);
            name.chars()
                .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
                .take(100)
                .collect::<String>()
                .trim_start_matches('.')
                .to_string()
        })
        .filter(|name| !name.is_empty());
    match base {
        Some(base) => format!("{}-{}.{}", base, job_id, ext),
        None => format!("{}.{}", job_id, ext),
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
