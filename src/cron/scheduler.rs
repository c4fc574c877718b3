use crate::bus::InboundMessage;
use crate::cron::types::{CronJob, CronStore};
use crate::utils::atomic_write;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Notify};
use tracing::{info, warn};

const POLL_WHEN_EMPTY: Duration = Duration::from_secs(30);
const MIN_SLEEP: Duration = Duration::from_millis(10);

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Cron-like job scheduler.
///
/// Jobs are ordered by fire-at; a single worker sleeps until the
/// earliest one (or until woken by an insert/cancel) and converts due
/// jobs into synthetic inbound messages. Recurring jobs are re-armed at
/// `fire_at + interval`; one-shots are removed after firing.
pub struct Scheduler {
    jobs: Arc<Mutex<Vec<CronJob>>>,
    notify: Arc<Notify>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    store_path: Option<PathBuf>,
    running: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(inbound_tx: mpsc::Sender<InboundMessage>, store_path: Option<PathBuf>) -> Self {
        let jobs = match &store_path {
            Some(path) if path.exists() => match std::fs::read_to_string(path)
                .map_err(anyhow::Error::from)
                .and_then(|c| serde_json::from_str::<CronStore>(&c).map_err(Into::into))
            {
                Ok(store) => store.jobs,
                Err(e) => {
                    warn!("failed to load cron store, starting empty: {}", e);
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        Self {
            jobs: Arc::new(Mutex::new(jobs)),
            notify: Arc::new(Notify::new()),
            inbound_tx,
            store_path,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn persist(store_path: Option<&PathBuf>, jobs: &[CronJob]) {
        let Some(path) = store_path else { return };
        let store = CronStore {
            jobs: jobs.to_vec(),
        };
        match serde_json::to_string_pretty(&store) {
            Ok(content) => {
                if let Err(e) = atomic_write(path, &content) {
                    warn!("failed to persist cron store: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize cron store: {}", e),
        }
    }

    /// Insert a job. An empty id is assigned a fresh uuid. Returns the
    /// stored job (with its id).
    pub fn schedule(&self, mut job: CronJob) -> Result<CronJob> {
        if job.recurring && job.interval_ms.map_or(true, |i| i <= 0) {
            anyhow::bail!("recurring job requires a positive interval");
        }
        if job.id.is_empty() {
            job.id = uuid::Uuid::new_v4().to_string();
        }

        let mut jobs = self
            .jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        jobs.push(job.clone());
        Self::persist(self.store_path.as_ref(), &jobs);
        drop(jobs);

        self.notify.notify_one();
        info!("scheduled job '{}' ({})", job.name, job.id);
        Ok(job)
    }

    /// All jobs, ordered by fire-at.
    pub fn list(&self) -> Vec<CronJob> {
        let jobs = self
            .jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut out = jobs.clone();
        out.sort_by_key(|j| j.fire_at_ms);
        out
    }

    /// Remove a job by id. Returns whether anything was removed.
    pub fn cancel(&self, id: &str) -> bool {
        let mut jobs = self
            .jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        let removed = jobs.len() < before;
        if removed {
            Self::persist(self.store_path.as_ref(), &jobs);
            info!("cancelled job {}", id);
        }
        drop(jobs);
        self.notify.notify_one();
        removed
    }

    /// Start the worker task.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let jobs = self.jobs.clone();
        let notify = self.notify.clone();
        let inbound_tx = self.inbound_tx.clone();
        let store_path = self.store_path.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            info!("scheduler started");
            loop {
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let now = now_ms();
                let mut due = Vec::new();
                let next_fire = {
                    let mut guard = jobs
                        .lock()
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    let mut dirty = false;
                    let mut kept = Vec::with_capacity(guard.len());
                    for mut job in guard.drain(..) {
                        if job.fire_at_ms <= now {
                            due.push(job.clone());
                            dirty = true;
                            if job.recurring {
                                let interval = job.interval_ms.unwrap_or(0).max(1);
                                // Advance past `now` so a stalled worker
                                // doesn't burst-fire missed periods.
                                while job.fire_at_ms <= now {
                                    job.fire_at_ms += interval;
                                }
                                kept.push(job);
                            }
                            // One-shot jobs are dropped once fired.
                        } else {
                            kept.push(job);
                        }
                    }
                    *guard = kept;
                    if dirty {
                        Self::persist(store_path.as_ref(), &guard);
                    }
                    guard.iter().map(|j| j.fire_at_ms).min()
                };

                for job in due {
                    info!("firing job '{}' ({})", job.name, job.id);
                    let inbound = InboundMessage::new(
                        job.channel.clone(),
                        "cron",
                        job.chat_id.clone(),
                        job.message.clone(),
                    );
                    // Blocking send: scheduler output is subject to the
                    // same inbound backpressure as every producer.
                    if inbound_tx.send(inbound).await.is_err() {
                        warn!("inbound queue closed, stopping scheduler");
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                }

                let sleep_for = match next_fire {
                    Some(next) => {
                        let delta = next - now_ms();
                        if delta <= 0 {
                            MIN_SLEEP
                        } else {
                            Duration::from_millis(delta as u64).max(MIN_SLEEP)
                        }
                    }
                    None => POLL_WHEN_EMPTY,
                };

                tokio::select! {
                    () = tokio::time::sleep(sleep_for) => {}
                    () = notify.notified() => {}
                }
            }
            info!("scheduler stopped");
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_one();
    }
}
