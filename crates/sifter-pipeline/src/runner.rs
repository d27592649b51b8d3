use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use sifter_core::config::PipelineConfig;
use sifter_core::event::{EventBus, Publisher};
use sifter_core::types::{Candidate, EventEnvelope, JobEvent, JobId, JobStatus};

use crate::graph::GraphExecutor;
use crate::pipeline::seed_state;

/// Status summary of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub query: String,
    pub status: JobStatus,
    /// Completed graph steps.
    pub steps: u64,
    /// Unique candidates collected so far.
    pub candidates: usize,
    /// The candidates themselves. Final once the job has finished, partial
    /// while it runs or when it failed.
    pub items: Vec<Candidate>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct Jobs {
    by_id: HashMap<JobId, JobInfo>,
    /// Submission order, oldest first.
    order: VecDeque<JobId>,
}

/// Tracks the status and results of submitted jobs.
///
/// Running jobs are always kept. Once more than `max_jobs` are tracked, the
/// oldest finished jobs are evicted.
pub struct JobRegistry {
    jobs: Mutex<Jobs>,
    max_jobs: usize,
}

impl JobRegistry {
    pub fn new(max_jobs: usize) -> Self {
        Self {
            jobs: Mutex::new(Jobs {
                by_id: HashMap::new(),
                order: VecDeque::new(),
            }),
            max_jobs: max_jobs.max(1),
        }
    }

    fn register(&self, id: &JobId, query: &str) {
        let info = JobInfo {
            id: id.clone(),
            query: query.to_string(),
            status: JobStatus::Running,
            steps: 0,
            candidates: 0,
            items: Vec::new(),
            created_at: Utc::now(),
            finished_at: None,
            error: None,
        };
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.by_id.insert(id.clone(), info);
        jobs.order.push_back(id.clone());
        self.evict(&mut jobs);
    }

    fn evict(&self, jobs: &mut Jobs) {
        let mut excess = jobs.by_id.len().saturating_sub(self.max_jobs);
        if excess == 0 {
            return;
        }
        let Jobs { by_id, order } = jobs;
        order.retain(|id| {
            let finished = by_id
                .get(id)
                .is_some_and(|info| info.status != JobStatus::Running);
            if excess > 0 && finished {
                by_id.remove(id);
                excess -= 1;
                debug!(job_id = %id, "Evicted finished job");
                false
            } else {
                true
            }
        });
    }

    fn record_step(&self, id: &JobId, steps: u64, candidates: &[Candidate]) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(info) = jobs.by_id.get_mut(id) {
            info.steps = steps;
            info.candidates = candidates.len();
            info.items = candidates.to_vec();
        }
    }

    fn finish(
        &self,
        id: &JobId,
        status: JobStatus,
        items: Vec<Candidate>,
        error: Option<String>,
    ) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(info) = jobs.by_id.get_mut(id) {
            info.status = status;
            info.candidates = items.len();
            info.items = items;
            info.finished_at = Some(Utc::now());
            info.error = error;
        }
        self.evict(&mut jobs);
    }

    /// Candidates recorded at the job's last completed step.
    fn latest_items(&self, id: &JobId) -> Vec<Candidate> {
        self.get(id).map(|info| info.items).unwrap_or_default()
    }

    pub fn get(&self, id: &JobId) -> Option<JobInfo> {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_id
            .get(id)
            .cloned()
    }

    /// All tracked jobs, oldest first.
    pub fn list(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.order
            .iter()
            .filter_map(|id| jobs.by_id.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_id
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs each submitted query as its own background task.
///
/// A job publishes `started`, one `progress` per graph step, then `results`
/// and `complete`. When the executor fails it publishes `error`, the partial
/// `results`, and `complete`. The job's channel is closed after `complete`.
#[derive(Clone)]
pub struct JobRunner {
    graph: Arc<GraphExecutor>,
    config: PipelineConfig,
    bus: Arc<EventBus>,
    registry: Arc<JobRegistry>,
}

impl JobRunner {
    pub fn new(graph: Arc<GraphExecutor>, config: PipelineConfig, bus: Arc<EventBus>) -> Self {
        Self {
            graph,
            bus,
            registry: Arc::new(JobRegistry::new(config.max_retained_jobs)),
            config,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Start a job and return its id. Subscribers attaching now may miss `started`.
    pub fn submit(&self, query: &str) -> JobId {
        let id = JobId::new();
        self.prepare(&id, query);
        self.spawn(id.clone(), query);
        id
    }

    /// Start a job with a subscription that sees every event, `started` included.
    pub fn submit_and_subscribe(
        &self,
        query: &str,
    ) -> (JobId, mpsc::UnboundedReceiver<EventEnvelope>) {
        let id = JobId::new();
        self.prepare(&id, query);
        // The channel stays open until the job's own task closes it
        let rx = self
            .bus
            .subscribe(&id)
            .unwrap_or_else(|| mpsc::unbounded_channel().1);
        self.spawn(id.clone(), query);
        (id, rx)
    }

    fn prepare(&self, id: &JobId, query: &str) {
        self.registry.register(id, query);
        self.bus.open(id);
    }

    fn spawn(&self, id: JobId, query: &str) {
        let runner = self.clone();
        let query = query.to_string();
        tokio::spawn(async move {
            info!(job_id = %id, query = %query, "Job started");
            let run = AssertUnwindSafe(runner.run(&id, &query)).catch_unwind().await;
            if run.is_err() {
                let message = "job aborted unexpectedly".to_string();
                let items = runner.registry.latest_items(&id);
                error!(job_id = %id, candidates = items.len(), "Job panicked");
                runner.emit(&id, JobEvent::Error { message: message.clone() });
                runner.emit(&id, JobEvent::Results { items: items.clone() });
                runner.registry.finish(&id, JobStatus::Failed, items, Some(message));
            }
            runner.emit(&id, JobEvent::Complete);
            runner.bus.close(&id);
        });
    }

    fn emit(&self, id: &JobId, event: JobEvent) {
        if let Err(e) = self.bus.publish(id, event) {
            warn!(job_id = %id, error = %e, "Failed to publish job event");
        }
    }

    /// Drive the graph and publish everything up to, not including, `complete`.
    async fn run(&self, id: &JobId, query: &str) {
        self.emit(id, JobEvent::Started);

        let mut execution = self.graph.start(seed_state(query, &self.config));
        let outcome = loop {
            match execution.step().await {
                Ok(Some(step)) => {
                    self.emit(
                        id,
                        JobEvent::Progress {
                            node: step.node.to_string(),
                            detail: step.update.describe(),
                            step: step.step_index as u64,
                        },
                    );
                    self.registry.record_step(
                        id,
                        step.step_index as u64 + 1,
                        &step.state.candidates,
                    );
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        let steps = execution.steps_taken();
        let candidates: Vec<Candidate> = execution.into_state().candidates;
        match outcome {
            Ok(()) => {
                info!(job_id = %id, steps, candidates = candidates.len(), "Job complete");
                self.emit(id, JobEvent::Results { items: candidates.clone() });
                self.registry.finish(id, JobStatus::Completed, candidates, None);
            }
            Err(e) => {
                error!(job_id = %id, steps, error = %e, "Job failed");
                let message = e.to_string();
                self.emit(id, JobEvent::Error { message: message.clone() });
                self.emit(id, JobEvent::Results { items: candidates.clone() });
                self.registry.finish(id, JobStatus::Failed, candidates, Some(message));
            }
        }
    }
}
