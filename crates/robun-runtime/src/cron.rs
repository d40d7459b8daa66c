//! Durable scheduled-job engine. Jobs live in a single versioned JSON
//! store owned exclusively by this service; a single sleeping worker wakes
//! to the soonest `nextRunAtMs` (min-heap over the enabled jobs) and every
//! mutation signals it to re-evaluate. Job payloads execute through the
//! agent loop's direct-injection callback.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as TokioMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use robun_core::{Result, RobunError, short_id};

const STORE_VERSION: u32 = 1;

/// Callback invoked for each due job — the agent loop's
/// `process_direct(payload.message, "cron:{id}", channel, to)`.
pub type OnJob = Arc<dyn Fn(CronJob) -> BoxFuture<'static, Result<String>> + Send + Sync>;

// ── Data model ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum CronSchedule {
    /// Fires once when wall-clock time reaches `at_ms`.
    At { at_ms: i64 },
    /// Fires every `every_ms` milliseconds from completion.
    Every { every_ms: i64 },
    /// Standard 5-field cron expression.
    Cron {
        expr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronPayloadKind {
    AgentTurn,
    SystemEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CronPayload {
    pub message: String,
    /// Deliver the reply to the target channel/chat when set.
    pub deliver: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub kind: CronPayloadKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CronRunStatus {
    Ok,
    Error,
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CronJobState {
    pub next_run_at_ms: Option<i64>,
    pub last_run_at_ms: Option<i64>,
    pub last_status: Option<CronRunStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub schedule: CronSchedule,
    pub payload: CronPayload,
    pub state: CronJobState,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    /// Only meaningful for `at` schedules.
    #[serde(default)]
    pub delete_after_run: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct CronStoreFile {
    version: u32,
    jobs: Vec<CronJob>,
}

/// Parameters for `add_job`.
#[derive(Debug, Clone)]
pub struct NewCronJob {
    pub name: String,
    pub schedule: CronSchedule,
    pub message: String,
    pub deliver: bool,
    pub channel: Option<String>,
    pub to: Option<String>,
    pub kind: CronPayloadKind,
    pub delete_after_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CronStatus {
    pub running: bool,
    pub jobs: usize,
    pub next_wake_ms: Option<i64>,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Standard 5-field expressions get a seconds field prepended — the
/// `cron` crate parses 6/7-field expressions only.
fn normalize_cron_expr(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

/// Next fire time for a schedule, evaluated at `now_ms`. `None` means no
/// future run (past one-shot, non-positive interval, unparseable cron).
pub fn compute_next_run(schedule: &CronSchedule, now: i64) -> Option<i64> {
    match schedule {
        CronSchedule::At { at_ms } => (*at_ms > now).then_some(*at_ms),
        CronSchedule::Every { every_ms } => (*every_ms > 0).then(|| now + every_ms),
        CronSchedule::Cron { expr, .. } => {
            let schedule = cron::Schedule::from_str(&normalize_cron_expr(expr)).ok()?;
            let after = chrono::DateTime::from_timestamp_millis(now)?;
            schedule
                .after(&after)
                .next()
                .map(|next| next.timestamp_millis())
        }
    }
}

// ── Service ────────────────────────────────────────────────────

pub struct CronService {
    store_path: PathBuf,
    jobs: TokioMutex<Vec<CronJob>>,
    notify: Notify,
    running: AtomicBool,
    on_job: OnJob,
    worker: TokioMutex<Option<JoinHandle<()>>>,
}

impl CronService {
    /// Load (or initialize) the store.
    pub async fn new(store_path: impl Into<PathBuf>, on_job: OnJob) -> Result<Self> {
        let store_path = store_path.into();
        let jobs = match tokio::fs::read_to_string(&store_path).await {
            Ok(raw) => match serde_json::from_str::<CronStoreFile>(&raw) {
                Ok(store) => store.jobs,
                Err(e) => {
                    warn!(?store_path, error = %e, "cron store unreadable — starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        info!(?store_path, jobs = jobs.len(), "cron store loaded");
        Ok(Self {
            store_path,
            jobs: TokioMutex::new(jobs),
            notify: Notify::new(),
            running: AtomicBool::new(false),
            on_job,
            worker: TokioMutex::new(None),
        })
    }

    /// Atomic replace of the store file.
    async fn persist(&self, jobs: &[CronJob]) -> Result<()> {
        if let Some(parent) = self.store_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_string_pretty(&CronStoreFile {
            version: STORE_VERSION,
            jobs: jobs.to_vec(),
        })?;
        let tmp = self.store_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &self.store_path).await?;
        Ok(())
    }

    /// Recompute next runs against `now`, persist, and start the worker.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut jobs = self.jobs.lock().await;
            let now = now_ms();
            for job in jobs.iter_mut() {
                if job.enabled {
                    job.state.next_run_at_ms = compute_next_run(&job.schedule, now);
                }
            }
            self.persist(&jobs).await?;
        }
        self.running.store(true, Ordering::SeqCst);

        let service = self.clone();
        let handle = tokio::spawn(async move { service.worker_loop().await });
        *self.worker.lock().await = Some(handle);
        info!("cron service started");
        Ok(())
    }

    /// Cancel the timer immediately; the current job batch finishes.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_one();
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
        info!("cron service stopped");
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }

            let next_wake = {
                let jobs = self.jobs.lock().await;
                soonest_run(&jobs)
            };

            match next_wake {
                None => {
                    // Nothing scheduled: sleep until a mutation wakes us.
                    self.notify.notified().await;
                    continue;
                }
                Some(at) => {
                    let now = now_ms();
                    if at > now {
                        let delay = Duration::from_millis((at - now) as u64);
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = self.notify.notified() => continue,
                        }
                    }
                }
            }
            if !self.running.load(Ordering::SeqCst) {
                return;
            }

            let now = now_ms();
            let due: Vec<String> = {
                let jobs = self.jobs.lock().await;
                jobs.iter()
                    .filter(|j| {
                        j.enabled && j.state.next_run_at_ms.is_some_and(|next| next <= now)
                    })
                    .map(|j| j.id.clone())
                    .collect()
            };

            for id in due {
                if let Err(e) = self.execute_job(&id).await {
                    error!(job = %id, error = %e, "cron job execution failed");
                }
            }
        }
    }

    /// Run one job through the callback and record the outcome. The jobs
    /// lock is never held across the callback.
    async fn execute_job(&self, id: &str) -> Result<()> {
        let job = {
            let jobs = self.jobs.lock().await;
            jobs.iter()
                .find(|j| j.id == id)
                .cloned()
                .ok_or_else(|| RobunError::Cron(format!("job not found: {id}")))?
        };

        debug!(job = %job.id, name = %job.name, "executing cron job");
        let outcome = (self.on_job)(job.clone()).await;

        let now = now_ms();
        let mut jobs = self.jobs.lock().await;
        let mut remove_after_run = None;
        if let Some(stored) = jobs.iter_mut().find(|j| j.id == id) {
            stored.state.last_run_at_ms = Some(now);
            match &outcome {
                Ok(_) => {
                    stored.state.last_status = Some(CronRunStatus::Ok);
                    stored.state.last_error = None;
                }
                Err(e) => {
                    stored.state.last_status = Some(CronRunStatus::Error);
                    stored.state.last_error = Some(e.to_string());
                }
            }
            stored.updated_at_ms = now;

            if matches!(stored.schedule, CronSchedule::At { .. }) {
                if stored.delete_after_run {
                    remove_after_run = Some(stored.id.clone());
                } else {
                    stored.enabled = false;
                    stored.state.next_run_at_ms = None;
                }
            } else {
                stored.state.next_run_at_ms = compute_next_run(&stored.schedule, now);
            }
        }
        if let Some(removed) = remove_after_run {
            jobs.retain(|j| j.id != removed);
        }
        self.persist(&jobs).await?;
        Ok(())
    }

    // ── Public operations ──────────────────────────────────────

    pub async fn add_job(&self, new: NewCronJob) -> Result<CronJob> {
        match &new.schedule {
            CronSchedule::Every { every_ms } if *every_ms <= 0 => {
                return Err(RobunError::Schedule(format!(
                    "everyMs must be positive, got {every_ms}"
                )));
            }
            CronSchedule::Cron { expr, .. } => {
                cron::Schedule::from_str(&normalize_cron_expr(expr)).map_err(|e| {
                    RobunError::Schedule(format!("invalid cron expression '{expr}': {e}"))
                })?;
            }
            _ => {}
        }

        let now = now_ms();
        let job = CronJob {
            id: short_id(),
            name: new.name,
            enabled: true,
            state: CronJobState {
                next_run_at_ms: compute_next_run(&new.schedule, now),
                ..Default::default()
            },
            schedule: new.schedule,
            payload: CronPayload {
                message: new.message,
                deliver: new.deliver,
                channel: new.channel,
                to: new.to,
                kind: new.kind,
            },
            created_at_ms: now,
            updated_at_ms: now,
            delete_after_run: new.delete_after_run,
        };

        let mut jobs = self.jobs.lock().await;
        jobs.push(job.clone());
        self.persist(&jobs).await?;
        drop(jobs);
        self.notify.notify_one();
        info!(job = %job.id, name = %job.name, "cron job added");
        Ok(job)
    }

    pub async fn remove_job(&self, id: &str) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        let removed = jobs.len() < before;
        if removed {
            self.persist(&jobs).await?;
        }
        drop(jobs);
        self.notify.notify_one();
        Ok(removed)
    }

    /// Enable or disable a job. Disabling nulls the next run.
    pub async fn enable_job(&self, id: &str, enabled: bool) -> Result<CronJob> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| RobunError::Cron(format!("job not found: {id}")))?;
        job.enabled = enabled;
        job.state.next_run_at_ms = if enabled {
            compute_next_run(&job.schedule, now_ms())
        } else {
            None
        };
        job.updated_at_ms = now_ms();
        let updated = job.clone();
        self.persist(&jobs).await?;
        drop(jobs);
        self.notify.notify_one();
        Ok(updated)
    }

    /// Manual trigger. Disabled jobs only run when `force` is set;
    /// otherwise the attempt is recorded as skipped.
    pub async fn run_job(&self, id: &str, force: bool) -> Result<bool> {
        let enabled = {
            let jobs = self.jobs.lock().await;
            jobs.iter()
                .find(|j| j.id == id)
                .map(|j| j.enabled)
                .ok_or_else(|| RobunError::Cron(format!("job not found: {id}")))?
        };
        if !enabled && !force {
            let mut jobs = self.jobs.lock().await;
            if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
                job.state.last_status = Some(CronRunStatus::Skipped);
                job.updated_at_ms = now_ms();
            }
            self.persist(&jobs).await?;
            return Ok(false);
        }
        self.execute_job(id).await?;
        Ok(true)
    }

    /// Jobs sorted by next run ascending, no-future-run jobs last.
    pub async fn list_jobs(&self, include_disabled: bool) -> Vec<CronJob> {
        let jobs = self.jobs.lock().await;
        let mut listed: Vec<CronJob> = jobs
            .iter()
            .filter(|j| include_disabled || j.enabled)
            .cloned()
            .collect();
        listed.sort_by_key(|j| match j.state.next_run_at_ms {
            Some(next) => (0, next),
            None => (1, i64::MAX),
        });
        listed
    }

    pub async fn get_job(&self, id: &str) -> Option<CronJob> {
        self.jobs.lock().await.iter().find(|j| j.id == id).cloned()
    }

    pub async fn status(&self) -> CronStatus {
        let jobs = self.jobs.lock().await;
        CronStatus {
            running: self.running.load(Ordering::SeqCst),
            jobs: jobs.len(),
            next_wake_ms: soonest_run(&jobs),
        }
    }
}

/// Min-heap over the enabled jobs' next-run times; the top is the worker's
/// next wake.
fn soonest_run(jobs: &[CronJob]) -> Option<i64> {
    let mut heap = BinaryHeap::new();
    for job in jobs {
        if job.enabled {
            if let Some(next) = job.state.next_run_at_ms {
                heap.push(Reverse(next));
            }
        }
    }
    heap.pop().map(|Reverse(next)| next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn noop_handler() -> OnJob {
        Arc::new(|_job: CronJob| Box::pin(async { Ok(String::new()) }))
    }

    fn recording_handler() -> (OnJob, Arc<Mutex<Vec<String>>>) {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        let handler: OnJob = Arc::new(move |job: CronJob| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().unwrap().push(job.payload.message.clone());
                Ok("done".to_string())
            })
        });
        (handler, seen)
    }

    fn failing_handler() -> OnJob {
        Arc::new(|_job: CronJob| {
            Box::pin(async { Err(RobunError::Agent("handler exploded".into())) })
        })
    }

    fn new_job(name: &str, schedule: CronSchedule) -> NewCronJob {
        NewCronJob {
            name: name.into(),
            schedule,
            message: format!("run {name}"),
            deliver: false,
            channel: None,
            to: None,
            kind: CronPayloadKind::AgentTurn,
            delete_after_run: false,
        }
    }

    async fn service(handler: OnJob) -> (tempfile::TempDir, Arc<CronService>) {
        let dir = tempfile::tempdir().unwrap();
        let svc = CronService::new(dir.path().join("jobs.json"), handler)
            .await
            .unwrap();
        (dir, Arc::new(svc))
    }

    // ── compute_next_run ───────────────────────────────────────

    #[test]
    fn next_run_for_at() {
        let now = 1_000_000;
        assert_eq!(
            compute_next_run(&CronSchedule::At { at_ms: now + 500 }, now),
            Some(now + 500)
        );
        assert_eq!(compute_next_run(&CronSchedule::At { at_ms: now }, now), None);
        assert_eq!(
            compute_next_run(&CronSchedule::At { at_ms: now - 1 }, now),
            None
        );
    }

    #[test]
    fn next_run_for_every() {
        let now = 50_000;
        assert_eq!(
            compute_next_run(&CronSchedule::Every { every_ms: 1_000 }, now),
            Some(51_000)
        );
        assert_eq!(
            compute_next_run(&CronSchedule::Every { every_ms: 0 }, now),
            None
        );
        assert_eq!(
            compute_next_run(&CronSchedule::Every { every_ms: -5 }, now),
            None
        );
    }

    #[test]
    fn next_run_for_cron_expression() {
        let now = Utc::now().timestamp_millis();
        // Standard 5-field form.
        let next = compute_next_run(
            &CronSchedule::Cron {
                expr: "* * * * *".into(),
                tz: None,
            },
            now,
        )
        .expect("every-minute cron always has a next run");
        assert!(next > now);
        assert!(next <= now + 61_000);

        // 6-field (with seconds) also accepted.
        assert!(
            compute_next_run(
                &CronSchedule::Cron {
                    expr: "0 * * * * *".into(),
                    tz: None
                },
                now
            )
            .is_some()
        );

        assert_eq!(
            compute_next_run(
                &CronSchedule::Cron {
                    expr: "not a cron".into(),
                    tz: None
                },
                now
            ),
            None
        );
    }

    // ── store operations ───────────────────────────────────────

    #[tokio::test]
    async fn add_then_remove_restores_store() {
        let (dir, svc) = service(noop_handler()).await;
        let before = std::fs::read_to_string(dir.path().join("jobs.json")).unwrap_or_default();

        let job = svc
            .add_job(new_job("tick", CronSchedule::Every { every_ms: 60_000 }))
            .await
            .unwrap();
        assert_eq!(job.id.len(), 8);
        assert!(svc.remove_job(&job.id).await.unwrap());

        let after = std::fs::read_to_string(dir.path().join("jobs.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&after).unwrap();
        assert_eq!(parsed["jobs"], serde_json::json!([]));
        // The pre-add state was either absent or an empty job list.
        assert!(before.is_empty() || before.contains("\"jobs\": []"));
    }

    #[tokio::test]
    async fn invalid_schedules_rejected() {
        let (_dir, svc) = service(noop_handler()).await;
        assert!(
            svc.add_job(new_job("bad", CronSchedule::Every { every_ms: 0 }))
                .await
                .is_err()
        );
        assert!(
            svc.add_job(new_job(
                "bad",
                CronSchedule::Cron {
                    expr: "nope".into(),
                    tz: None
                }
            ))
            .await
            .is_err()
        );
    }

    #[tokio::test]
    async fn store_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        {
            let svc = CronService::new(&path, noop_handler()).await.unwrap();
            svc.add_job(new_job("persisted", CronSchedule::Every { every_ms: 1_000 }))
                .await
                .unwrap();
        }
        let svc = CronService::new(&path, noop_handler()).await.unwrap();
        let jobs = svc.list_jobs(true).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "persisted");
    }

    // ── execution semantics ────────────────────────────────────

    #[tokio::test]
    async fn at_shot_disables_after_run() {
        let (handler, seen) = recording_handler();
        let (_dir, svc) = service(handler).await;

        let job = svc
            .add_job(NewCronJob {
                delete_after_run: false,
                ..new_job("one-shot", CronSchedule::At { at_ms: now_ms() - 1 })
            })
            .await
            .unwrap();

        assert!(svc.run_job(&job.id, true).await.unwrap());
        assert_eq!(seen.lock().unwrap().as_slice(), ["run one-shot"]);

        let listed = svc.list_jobs(true).await;
        assert_eq!(listed.len(), 1);
        let stored = &listed[0];
        assert!(!stored.enabled);
        assert_eq!(stored.state.next_run_at_ms, None);
        assert_eq!(stored.state.last_status, Some(CronRunStatus::Ok));
    }

    #[tokio::test]
    async fn delete_after_run_vanishes() {
        let (_dir, svc) = service(noop_handler()).await;
        let job = svc
            .add_job(NewCronJob {
                delete_after_run: true,
                ..new_job("ephemeral", CronSchedule::At { at_ms: now_ms() - 1 })
            })
            .await
            .unwrap();

        svc.run_job(&job.id, true).await.unwrap();
        assert!(svc.list_jobs(true).await.is_empty());
        assert!(svc.get_job(&job.id).await.is_none());
    }

    #[tokio::test]
    async fn every_job_recomputes_from_now() {
        let (_dir, svc) = service(noop_handler()).await;
        let job = svc
            .add_job(new_job("tick", CronSchedule::Every { every_ms: 5_000 }))
            .await
            .unwrap();

        let before = now_ms();
        svc.run_job(&job.id, true).await.unwrap();
        let after = now_ms();

        let stored = svc.get_job(&job.id).await.unwrap();
        let next = stored.state.next_run_at_ms.unwrap();
        assert!(next >= before + 5_000 && next <= after + 5_000 + 100);
    }

    #[tokio::test]
    async fn handler_errors_are_recorded_not_raised() {
        let (_dir, svc) = service(failing_handler()).await;
        let job = svc
            .add_job(new_job("doomed", CronSchedule::Every { every_ms: 1_000 }))
            .await
            .unwrap();

        svc.run_job(&job.id, true).await.unwrap();
        let stored = svc.get_job(&job.id).await.unwrap();
        assert_eq!(stored.state.last_status, Some(CronRunStatus::Error));
        assert!(stored.state.last_error.as_deref().unwrap().contains("handler exploded"));
        // The recurring schedule still advances after a failure.
        assert!(stored.state.next_run_at_ms.is_some());
    }

    #[tokio::test]
    async fn disabled_job_skipped_without_force() {
        let (handler, seen) = recording_handler();
        let (_dir, svc) = service(handler).await;
        let job = svc
            .add_job(new_job("paused", CronSchedule::Every { every_ms: 1_000 }))
            .await
            .unwrap();
        svc.enable_job(&job.id, false).await.unwrap();

        assert!(!svc.run_job(&job.id, false).await.unwrap());
        assert!(seen.lock().unwrap().is_empty());
        let stored = svc.get_job(&job.id).await.unwrap();
        assert_eq!(stored.state.last_status, Some(CronRunStatus::Skipped));
        assert_eq!(stored.state.next_run_at_ms, None);

        assert!(svc.run_job(&job.id, true).await.unwrap());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_sorted_with_nulls_last() {
        let (_dir, svc) = service(noop_handler()).await;
        let far = svc
            .add_job(new_job("far", CronSchedule::Every { every_ms: 100_000 }))
            .await
            .unwrap();
        let near = svc
            .add_job(new_job("near", CronSchedule::Every { every_ms: 1_000 }))
            .await
            .unwrap();
        let parked = svc
            .add_job(new_job("parked", CronSchedule::Every { every_ms: 50_000 }))
            .await
            .unwrap();
        svc.enable_job(&parked.id, false).await.unwrap();

        let listed = svc.list_jobs(true).await;
        assert_eq!(listed[0].id, near.id);
        assert_eq!(listed[1].id, far.id);
        assert_eq!(listed[2].id, parked.id);

        let enabled_only = svc.list_jobs(false).await;
        assert_eq!(enabled_only.len(), 2);
    }

    #[tokio::test]
    async fn worker_fires_due_jobs() {
        let (handler, seen) = recording_handler();
        let (_dir, svc) = service(handler).await;
        svc.start().await.unwrap();

        svc.add_job(NewCronJob {
            delete_after_run: true,
            ..new_job("soon", CronSchedule::At { at_ms: now_ms() + 50 })
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(400)).await;
        svc.stop().await;
        assert_eq!(seen.lock().unwrap().as_slice(), ["run soon"]);

        let status = svc.status().await;
        assert!(!status.running);
        assert_eq!(status.jobs, 0);
    }
}
