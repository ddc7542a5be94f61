use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::RwLock;
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub job_id: String,
    /// Jobs sharing a key never run at the same time.
    pub session_key: String,
    pub priority: i32,
    pub queued_at: DateTime<Utc>,
}

pub type ExecutorFuture = Pin<Box<dyn Future<Output = bool> + Send>>;
pub type Executor = Arc<dyn Fn(String) -> ExecutorFuture + Send + Sync>;

#[derive(Clone)]
pub struct Scheduler {
    queue: Arc<Mutex<Vec<ScheduledJob>>>,
    running_global: Arc<Mutex<usize>>,
    running_sessions: Arc<Mutex<HashMap<String, usize>>>,
    notify: Arc<Notify>,
    executor: Arc<RwLock<Option<Executor>>>,
    global_limit: usize,
    per_session_limit: usize,
    max_queue_size: usize,
}

impl Scheduler {
    pub fn new(global_limit: usize, per_session_limit: usize, max_queue_size: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(Vec::new())),
            running_global: Arc::new(Mutex::new(0)),
            running_sessions: Arc::new(Mutex::new(HashMap::new())),
            notify: Arc::new(Notify::new()),
            executor: Arc::new(RwLock::new(None)),
            global_limit: global_limit.max(1),
            per_session_limit: per_session_limit.max(1),
            max_queue_size,
        }
    }

    pub fn set_executor(&self, executor: Executor) {
        match self.executor.write() {
            Ok(mut writer) => *writer = Some(executor),
            Err(poisoned) => *poisoned.into_inner() = Some(executor),
        }
    }

    pub async fn enqueue(&self, job: ScheduledJob) -> Result<(), String> {
        {
            let mut queue = self.queue.lock().await;
            if queue.iter().any(|queued| queued.job_id == job.job_id) {
                return Ok(());
            }
            if queue.len() >= self.max_queue_size {
                return Err(format!(
                    "Queue capacity exceeded (max {}).",
                    self.max_queue_size
                ));
            }
            queue.push(job);
        }
        self.notify.notify_one();
        Ok(())
    }

    pub async fn has_capacity(&self) -> bool {
        let queue = self.queue.lock().await;
        queue.len() < self.max_queue_size
    }

    pub async fn queued_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub fn start(&self) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_loop().await;
        });
    }

    async fn run_loop(self) {
        loop {
            self.notify.notified().await;
            while let Some(job) = self.take_runnable_job().await {
                let scheduler = self.clone();
                tokio::spawn(async move {
                    let failed = scheduler.execute(job.job_id.clone()).await;
                    scheduler.release_slot(&job.session_key).await;
                    if failed {
                        tracing::warn!(job_id = %job.job_id, "scheduled job finished in failed state");
                    }
                    scheduler.notify.notify_one();
                });
            }
        }
    }

    async fn execute(&self, job_id: String) -> bool {
        let executor = match self.executor.read() {
            Ok(reader) => reader.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match executor {
            Some(executor) => executor(job_id).await,
            None => true,
        }
    }

    /// Removes the highest-priority job whose session has a free slot and
    /// reserves that slot. Jobs for busy sessions stay queued.
    async fn take_runnable_job(&self) -> Option<ScheduledJob> {
        let mut queue = self.queue.lock().await;
        if queue.is_empty() {
            return None;
        }

        let mut global = self.running_global.lock().await;
        if *global >= self.global_limit {
            return None;
        }

        let mut session_map = self.running_sessions.lock().await;
        let now = Utc::now();
        let best_index = queue
            .iter()
            .enumerate()
            .filter(|(_, job)| {
                session_map.get(&job.session_key).copied().unwrap_or(0) < self.per_session_limit
            })
            .max_by_key(|(index, job)| (effective_priority(job, now), std::cmp::Reverse(*index)))
            .map(|(index, _)| index)?;

        let job = queue.remove(best_index);
        *global += 1;
        *session_map.entry(job.session_key.clone()).or_insert(0) += 1;
        Some(job)
    }

    async fn release_slot(&self, session_key: &str) {
        let mut global = self.running_global.lock().await;
        if *global > 0 {
            *global -= 1;
        }

        let mut session_map = self.running_sessions.lock().await;
        if let Some(entry) = session_map.get_mut(session_key) {
            if *entry > 0 {
                *entry -= 1;
            }
            if *entry == 0 {
                session_map.remove(session_key);
            }
        }
    }
}

fn effective_priority(job: &ScheduledJob, now: DateTime<Utc>) -> i64 {
    let waited = (now - job.queued_at).num_seconds().max(0);
    i64::from(job.priority) * 100 + waited / 15
}
