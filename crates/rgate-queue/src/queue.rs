//! Single-owner job queue actor.
//!
//! One task owns the job table and the FIFO. Everything else talks to it
//! through a [`QueueHandle`]: writes are messages, reads come from an
//! immutable [`QueueSnapshot`] published on a watch channel after every
//! change, so status polling never waits on the actor. Jobs are shared
//! between the table and snapshots; a change copies only the job it touches.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rgate_models::{ApiErrorBody, ExecutionPlan, Job, JobArtifacts, JobId, JobStatus, RenderOutput, RoutingDecision};

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};

/// Read-only view of the queue at one point in time.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    jobs: HashMap<JobId, Arc<Job>>,
    pending: Vec<JobId>,
    current: Option<JobId>,
}

impl QueueSnapshot {
    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id).map(Arc::as_ref)
    }

    /// Jobs waiting for the worker.
    pub fn queue_length(&self) -> usize {
        self.pending.len()
    }

    /// The job currently rendering.
    pub fn current_job(&self) -> Option<&JobId> {
        self.current.as_ref()
    }

    /// Waiting job ids in execution order.
    pub fn pending(&self) -> &[JobId] {
        &self.pending
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }
}

/// A plan submitted for rendering.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub id: JobId,
    pub plan: ExecutionPlan,
    /// Base name for the rendered file; the job id when absent.
    pub output_name: Option<String>,
}

impl JobRequest {
    pub fn new(plan: ExecutionPlan) -> Self {
        Self {
            id: JobId::new(),
            plan,
            output_name: None,
        }
    }

    pub fn with_output_name(mut self, name: Option<String>) -> Self {
        self.output_name = name;
        self
    }
}

/// A job handed to the worker.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: Job,
    pub plan: Arc<ExecutionPlan>,
    pub output_name: Option<String>,
}

struct PendingPlan {
    plan: Arc<ExecutionPlan>,
    output_name: Option<String>,
}

/// Non-terminal change reported by the worker.
#[derive(Debug, Clone)]
pub enum JobUpdate {
    Route(RoutingDecision),
    Progress(u8),
    Logs { lines: Vec<String>, keep: usize },
}

/// How a job ended.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Done(RenderOutput),
    Failed(ApiErrorBody),
    Partial(Box<JobArtifacts>),
}

enum Command {
    Enqueue {
        request: Box<JobRequest>,
        reply: oneshot::Sender<Job>,
    },
    Claim {
        reply: oneshot::Sender<QueueResult<ClaimedJob>>,
    },
    Update {
        id: JobId,
        update: JobUpdate,
    },
    Finish {
        id: JobId,
        outcome: JobOutcome,
        reply: oneshot::Sender<QueueResult<Job>>,
    },
}

/// Cloneable handle to the queue actor.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Arc<QueueSnapshot>>,
}

impl QueueHandle {
    /// Admit a plan. Returns the queued job with its position.
    pub async fn enqueue(&self, plan: ExecutionPlan) -> QueueResult<Job> {
        self.submit(JobRequest::new(plan)).await
    }

    /// Admit a full request.
    pub async fn submit(&self, request: JobRequest) -> QueueResult<Job> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Enqueue {
            request: Box::new(request),
            reply,
        })
        .await?;
        rx.await.map_err(|_| QueueError::ActorGone)
    }

    /// Wait for the next job and mark it running.
    pub async fn claim(&self) -> QueueResult<ClaimedJob> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Claim { reply }).await?;
        rx.await.map_err(|_| QueueError::ActorGone)?
    }

    /// Report a non-terminal change for the running job.
    pub async fn update(&self, id: &JobId, update: JobUpdate) -> QueueResult<()> {
        self.send(Command::Update { id: id.clone(), update }).await
    }

    /// Resolve a job to a terminal state.
    pub async fn finish(&self, id: &JobId, outcome: JobOutcome) -> QueueResult<Job> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Finish {
            id: id.clone(),
            outcome,
            reply,
        })
        .await?;
        rx.await.map_err(|_| QueueError::ActorGone)?
    }

    /// Current job record, if known.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.snapshot.borrow().get(id).cloned()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<QueueSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<QueueSnapshot>> {
        self.snapshot.clone()
    }

    async fn send(&self, command: Command) -> QueueResult<()> {
        self.tx.send(command).await.map_err(|_| QueueError::ActorGone)
    }
}

/// Constructor for the queue actor.
pub struct JobQueue;

impl JobQueue {
    /// Spawn the actor. It stops once every handle is dropped.
    pub fn spawn(config: QueueConfig) -> (QueueHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(QueueSnapshot::default()));

        let actor = QueueActor {
            config,
            jobs: HashMap::new(),
            plans: HashMap::new(),
            pending: VecDeque::new(),
            current: None,
            finished: VecDeque::new(),
            parked: None,
            snapshot_tx,
        };
        let handle = tokio::spawn(actor.run(rx));

        (
            QueueHandle {
                tx,
                snapshot: snapshot_rx,
            },
            handle,
        )
    }
}

struct QueueActor {
    config: QueueConfig,
    jobs: HashMap<JobId, Arc<Job>>,
    plans: HashMap<JobId, PendingPlan>,
    pending: VecDeque<JobId>,
    current: Option<JobId>,
    /// Terminal jobs, oldest first
    finished: VecDeque<JobId>,
    /// A worker waiting for work
    parked: Option<oneshot::Sender<QueueResult<ClaimedJob>>>,
    snapshot_tx: watch::Sender<Arc<QueueSnapshot>>,
}

impl QueueActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!("Job queue started");
        while let Some(command) = rx.recv().await {
            match command {
                Command::Enqueue { request, reply } => {
                    let job = self.enqueue(*request);
                    let _ = reply.send(job);
                }
                Command::Claim { reply } => self.claim(reply),
                Command::Update { id, update } => self.update(&id, update),
                Command::Finish { id, outcome, reply } => {
                    let result = self.finish(&id, outcome);
                    let _ = reply.send(result);
                }
            }
            self.publish();
        }
        info!("Job queue stopped");
    }

    fn enqueue(&mut self, request: JobRequest) -> Job {
        let JobRequest { id, plan, output_name } = request;
        let position = self.pending.len() + usize::from(self.current.is_some());
        let job = Job::new(id.clone(), &plan, position);

        self.jobs.insert(id.clone(), Arc::new(job.clone()));
        self.plans.insert(
            id.clone(),
            PendingPlan {
                plan: Arc::new(plan),
                output_name,
            },
        );
        self.pending.push_back(id.clone());

        metrics::counter!("rgate_jobs_enqueued_total").increment(1);
        debug!(job_id = %id, position, "Job enqueued");

        self.dispatch();
        self.jobs.get(&id).map(|j| Job::clone(j)).unwrap_or(job)
    }

    fn claim(&mut self, reply: oneshot::Sender<QueueResult<ClaimedJob>>) {
        if let Some(current) = &self.current {
            let _ = reply.send(Err(QueueError::Busy(current.clone())));
            return;
        }
        self.parked = Some(reply);
        self.dispatch();
    }

    /// Hand the head of the FIFO to a parked worker, if both exist.
    fn dispatch(&mut self) {
        if self.current.is_some() {
            return;
        }
        let Some(reply) = self.parked.take() else {
            return;
        };
        if reply.is_closed() {
            return;
        }

        while let Some(id) = self.pending.pop_front() {
            let (Some(job), Some(pending)) = (self.jobs.get_mut(&id), self.plans.remove(&id)) else {
                warn!(job_id = %id, "Pending job vanished from the table");
                continue;
            };
            let job = Arc::make_mut(job);
            if let Err(e) = job.start() {
                warn!(job_id = %id, error = %e, "Skipping job that cannot start");
                continue;
            }

            let claimed = ClaimedJob {
                job: job.clone(),
                plan: pending.plan,
                output_name: pending.output_name,
            };
            self.current = Some(id.clone());
            self.reposition();

            if let Err(Ok(claimed)) = reply.send(Ok(claimed)) {
                // Worker went away between parking and dispatch; put the job back
                self.jobs
                    .insert(id.clone(), Arc::new(Job::new(id.clone(), &claimed.plan, 0)));
                self.plans.insert(
                    id.clone(),
                    PendingPlan {
                        plan: claimed.plan,
                        output_name: claimed.output_name,
                    },
                );
                self.pending.push_front(id);
                self.current = None;
                self.reposition();
            }
            return;
        }

        self.parked = Some(reply);
    }

    fn update(&mut self, id: &JobId, update: JobUpdate) {
        let Some(job) = self.jobs.get_mut(id) else {
            warn!(job_id = %id, "Update for unknown job");
            return;
        };
        let job = Arc::make_mut(job);
        let result = match update {
            JobUpdate::Route(decision) => job.set_route(&decision),
            JobUpdate::Progress(pct) => job.set_progress(pct),
            JobUpdate::Logs { lines, keep } => job.push_logs(lines, keep),
        };
        if let Err(e) = result {
            warn!(job_id = %id, error = %e, "Ignoring update");
        }
    }

    fn finish(&mut self, id: &JobId, outcome: JobOutcome) -> QueueResult<Job> {
        let job = Arc::make_mut(self.jobs.get_mut(id).ok_or_else(|| QueueError::JobNotFound(id.clone()))?);
        let was_pending = job.status == JobStatus::Queued;

        match outcome {
            JobOutcome::Done(output) => job.complete(output)?,
            JobOutcome::Failed(error) => job.fail(error)?,
            JobOutcome::Partial(artifacts) => job.partial(*artifacts)?,
        }
        let finished = job.clone();

        metrics::counter!("rgate_jobs_finished_total", "status" => finished.status.as_str()).increment(1);
        info!(job_id = %id, status = %finished.status, "Job finished");

        if was_pending {
            self.pending.retain(|p| p != id);
            self.plans.remove(id);
        }
        if self.current.as_ref() == Some(id) {
            self.current = None;
        }
        self.finished.push_back(id.clone());
        self.evict();
        self.reposition();
        self.dispatch();

        Ok(finished)
    }

    /// Drop the oldest terminal jobs beyond the retention cap.
    fn evict(&mut self) {
        while self.finished.len() > self.config.max_retained_jobs {
            if let Some(old) = self.finished.pop_front() {
                self.jobs.remove(&old);
                debug!(job_id = %old, "Evicted finished job");
            }
        }
    }

    /// Recompute queue positions: jobs ahead, counting the running one.
    fn reposition(&mut self) {
        let offset = usize::from(self.current.is_some());
        for (i, id) in self.pending.iter().enumerate() {
            if let Some(job) = self.jobs.get_mut(id) {
                if job.queue_position != i + offset {
                    Arc::make_mut(job).queue_position = i + offset;
                }
            }
        }
    }

    fn publish(&self) {
        metrics::gauge!("rgate_queue_length").set(self.pending.len() as f64);
        let snapshot = QueueSnapshot {
            jobs: self.jobs.clone(),
            pending: self.pending.iter().cloned().collect(),
            current: self.current.clone(),
        };
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use rgate_models::ErrorCode;

    fn plan(id: &str) -> ExecutionPlan {
        serde_json::from_value(serde_json::json!({
            "plan_id": id,
            "output_format": { "width": 640, "height": 360 },
            "timeline": [{
                "segment_id": "s1",
                "asset_url": "/uploads/a.mp4",
                "trim_start_ms": 0,
                "trim_end_ms": 1000,
                "timeline_start_ms": 0,
                "timeline_end_ms": 1000,
                "output_duration_ms": 1000
            }]
        }))
        .unwrap()
    }

    fn output() -> RenderOutput {
        RenderOutput {
            output_url: "/outputs/x.mp4".to_string(),
            output_size: 10,
            duration_ms: 5,
        }
    }

    fn spawn(max_retained_jobs: usize) -> QueueHandle {
        let (handle, _task) = JobQueue::spawn(QueueConfig {
            capacity: 16,
            max_retained_jobs,
        });
        handle
    }

    #[tokio::test]
    async fn test_enqueue_positions() {
        let queue = spawn(10);
        let a = queue.enqueue(plan("a")).await.unwrap();
        let b = queue.enqueue(plan("b")).await.unwrap();
        let c = queue.enqueue(plan("c")).await.unwrap();

        assert_eq!(a.queue_position, 0);
        assert_eq!(b.queue_position, 1);
        assert_eq!(c.queue_position, 2);
        assert_eq!(a.status, JobStatus::Queued);

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.queue_length(), 3);
        assert_eq!(snapshot.pending(), &[a.id.clone(), b.id.clone(), c.id.clone()]);
        assert!(snapshot.current_job().is_none());
    }

    #[tokio::test]
    async fn test_fifo_claim_and_positions_shrink() {
        let queue = spawn(10);
        let a = queue.enqueue(plan("a")).await.unwrap();
        let b = queue.enqueue(plan("b")).await.unwrap();
        let c = queue.enqueue(plan("c")).await.unwrap();

        let claimed = queue.claim().await.unwrap();
        assert_eq!(claimed.job.id, a.id);
        assert_eq!(claimed.job.status, JobStatus::Running);
        assert_eq!(claimed.plan.plan_id, "a");

        // Running job still counts as ahead
        assert_eq!(queue.get(&b.id).unwrap().queue_position, 1);
        assert_eq!(queue.get(&c.id).unwrap().queue_position, 2);

        queue.finish(&a.id, JobOutcome::Done(output())).await.unwrap();
        assert_eq!(queue.get(&b.id).unwrap().queue_position, 0);
        assert_eq!(queue.get(&c.id).unwrap().queue_position, 1);

        let next = queue.claim().await.unwrap();
        assert_eq!(next.job.id, b.id);
        assert_eq!(queue.get(&c.id).unwrap().queue_position, 1);
    }

    #[tokio::test]
    async fn test_claim_parks_until_enqueue() {
        let queue = spawn(10);
        let worker = queue.clone();
        let claim = tokio::spawn(async move { worker.claim().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!claim.is_finished());

        let job = queue.enqueue(plan("late")).await.unwrap();
        let claimed = tokio::time::timeout(Duration::from_secs(1), claim)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(claimed.job.id, job.id);
        assert_eq!(queue.get(&job.id).unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_second_claim_is_busy() {
        let queue = spawn(10);
        let job = queue.enqueue(plan("a")).await.unwrap();
        queue.claim().await.unwrap();

        match queue.claim().await {
            Err(QueueError::Busy(id)) => assert_eq!(id, job.id),
            other => panic!("expected busy, got {:?}", other.map(|c| c.job.id)),
        }
    }

    #[tokio::test]
    async fn test_terminal_jobs_are_immutable() {
        let queue = spawn(10);
        let job = queue.enqueue(plan("a")).await.unwrap();
        queue.claim().await.unwrap();
        queue
            .finish(&job.id, JobOutcome::Failed(ApiErrorBody::new(ErrorCode::FfmpegError, "boom")))
            .await
            .unwrap();

        let again = queue.finish(&job.id, JobOutcome::Done(output())).await;
        assert!(matches!(again, Err(QueueError::Transition(_))));

        queue.update(&job.id, JobUpdate::Progress(50)).await.unwrap();
        let stored = queue.get(&job.id).unwrap();
        assert_eq!(stored.status, JobStatus::Error);
        assert_eq!(stored.progress_pct, 0);
        assert_eq!(stored.error.unwrap().code, ErrorCode::FfmpegError);
    }

    #[tokio::test]
    async fn test_progress_and_logs() {
        let queue = spawn(10);
        let job = queue.enqueue(plan("a")).await.unwrap();
        queue.claim().await.unwrap();

        queue.update(&job.id, JobUpdate::Progress(40)).await.unwrap();
        queue.update(&job.id, JobUpdate::Progress(20)).await.unwrap();
        let lines = (0..5).map(|i| format!("line {}", i)).collect();
        queue.update(&job.id, JobUpdate::Logs { lines, keep: 3 }).await.unwrap();

        // A finish round-trip guarantees the updates were applied
        let done = queue.finish(&job.id, JobOutcome::Done(output())).await.unwrap();
        assert_eq!(done.progress_pct, 100);
        assert_eq!(done.logs_tail, vec!["line 2", "line 3", "line 4"]);
    }

    #[tokio::test]
    async fn test_snapshots_share_untouched_jobs() {
        let queue = spawn(10);
        let a = queue.enqueue(plan("a")).await.unwrap();
        let b = queue.enqueue(plan("b")).await.unwrap();
        queue.claim().await.unwrap();
        let before = queue.snapshot();

        queue.update(&a.id, JobUpdate::Progress(40)).await.unwrap();
        // Enqueue replies only after the update above was applied
        queue.enqueue(plan("c")).await.unwrap();
        let after = queue.snapshot();

        assert_eq!(before.get(&a.id).unwrap().progress_pct, 0);
        assert_eq!(after.get(&a.id).unwrap().progress_pct, 40);
        assert!(!Arc::ptr_eq(&before.jobs[&a.id], &after.jobs[&a.id]));
        assert!(Arc::ptr_eq(&before.jobs[&b.id], &after.jobs[&b.id]));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_while_running() {
        let queue = spawn(10);
        let job = queue.enqueue(plan("a")).await.unwrap();
        queue.claim().await.unwrap();
        let mut rx = queue.subscribe();

        queue.update(&job.id, JobUpdate::Progress(60)).await.unwrap();
        queue.update(&job.id, JobUpdate::Progress(30)).await.unwrap();
        queue.update(&job.id, JobUpdate::Progress(100)).await.unwrap();

        let pct = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                rx.changed().await.unwrap();
                let pct = rx.borrow().get(&job.id).map(|j| j.progress_pct).unwrap_or(0);
                if pct >= 99 {
                    return pct;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(pct, 99);
    }

    #[tokio::test]
    async fn test_cancel_queued_job() {
        let queue = spawn(10);
        let a = queue.enqueue(plan("a")).await.unwrap();
        let b = queue.enqueue(plan("b")).await.unwrap();

        queue
            .finish(&a.id, JobOutcome::Failed(ApiErrorBody::new(ErrorCode::InternalError, "shutdown")))
            .await
            .unwrap();
        assert_eq!(queue.get(&b.id).unwrap().queue_position, 0);

        let claimed = queue.claim().await.unwrap();
        assert_eq!(claimed.job.id, b.id);
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest_finished() {
        let queue = spawn(2);
        let mut ids = Vec::new();
        for name in ["a", "b", "c"] {
            let job = queue.enqueue(plan(name)).await.unwrap();
            queue.claim().await.unwrap();
            queue.finish(&job.id, JobOutcome::Done(output())).await.unwrap();
            ids.push(job.id);
        }

        assert!(queue.get(&ids[0]).is_none());
        assert!(queue.get(&ids[1]).is_some());
        assert!(queue.get(&ids[2]).is_some());
        assert_eq!(queue.snapshot().job_count(), 2);
    }

    #[tokio::test]
    async fn test_submit_carries_output_name() {
        let queue = spawn(10);
        let request = JobRequest::new(plan("a")).with_output_name(Some("promo".to_string()));
        let id = request.id.clone();
        let job = queue.submit(request).await.unwrap();
        assert_eq!(job.id, id);

        let claimed = queue.claim().await.unwrap();
        assert_eq!(claimed.output_name.as_deref(), Some("promo"));
    }

    #[tokio::test]
    async fn test_finish_unknown_job() {
        let queue = spawn(10);
        let result = queue.finish(&JobId::from_string("nope"), JobOutcome::Done(output())).await;
        assert!(matches!(result, Err(QueueError::JobNotFound(_))));
    }
}
