//! Periodic autonomous check-in driven by a watched file. Every interval
//! the service reads `HEARTBEAT.md` from the workspace; when the file has
//! actionable content the agent gets a fixed prompt on its own session.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{Mutex as TokioMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use robun_core::Result;

/// Session key the heartbeat turns run under.
pub const HEARTBEAT_SESSION_KEY: &str = "heartbeat:system";

/// Fixed prompt handed to the agent on an actionable tick.
pub const HEARTBEAT_PROMPT: &str =
    "Read HEARTBEAT.md in your workspace and work on anything that needs attention. \
     If nothing needs attention, reply with just: HEARTBEAT_OK";

/// The agent loop's direct-injection path, typed as a callback so the
/// service stays decoupled from the loop.
pub type HeartbeatHandler =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<String>> + Send + Sync>;

/// A heartbeat file is skippable when every line is blank, a `#` header,
/// or an HTML comment — unless any line carries a checkbox, which counts
/// as actionable even in a header-only file.
pub fn has_actionable_content(content: &str) -> bool {
    content.lines().any(|line| {
        let trimmed = line.trim();
        if trimmed.contains("- [ ]") || trimmed.contains("- [x]") {
            return true;
        }
        !trimmed.is_empty() && !trimmed.starts_with('#') && !trimmed.starts_with("<!--")
    })
}

pub struct HeartbeatService {
    workspace: PathBuf,
    interval: Duration,
    handler: HeartbeatHandler,
    running: AtomicBool,
    stop_notify: Notify,
    worker: TokioMutex<Option<JoinHandle<()>>>,
}

impl HeartbeatService {
    pub fn new(workspace: PathBuf, interval_secs: u64, handler: HeartbeatHandler) -> Self {
        Self {
            workspace,
            interval: Duration::from_secs(interval_secs),
            handler,
            running: AtomicBool::new(false),
            stop_notify: Notify::new(),
            worker: TokioMutex::new(None),
        }
    }

    pub async fn start(self: &Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        let service = self.clone();
        let handle = tokio::spawn(async move {
            info!(interval_secs = service.interval.as_secs(), "heartbeat started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(service.interval) => {}
                    _ = service.stop_notify.notified() => break,
                }
                if !service.running.load(Ordering::SeqCst) {
                    break;
                }
                service.tick().await;
            }
            info!("heartbeat stopped");
        });
        *self.worker.lock().await = Some(handle);
    }

    /// Cancel cleanly, including before the first tick.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_notify.notify_one();
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// One heartbeat check. Public so the gateway and tests can force a
    /// tick without waiting for the interval.
    pub async fn tick(&self) {
        let path = self.workspace.join("HEARTBEAT.md");
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(_) => {
                debug!(?path, "no heartbeat file — skipping tick");
                return;
            }
        };
        if !has_actionable_content(&content) {
            debug!("heartbeat file has no actionable content — skipping tick");
            return;
        }

        match (self.handler)(HEARTBEAT_PROMPT.to_string()).await {
            Ok(reply) => {
                let normalized = reply.to_uppercase().replace('_', "");
                if normalized.contains("HEARTBEATOK") {
                    debug!("heartbeat: nothing needed attention");
                } else {
                    info!(reply = %reply.chars().take(120).collect::<String>(), "heartbeat completed a task");
                }
            }
            Err(e) => warn!(error = %e, "heartbeat turn failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn header_only_files_are_not_actionable() {
        assert!(!has_actionable_content(""));
        assert!(!has_actionable_content("# Tasks\n\n"));
        assert!(!has_actionable_content("# Tasks\n<!-- fill me in -->\n\n## Later\n"));
    }

    #[test]
    fn plain_text_is_actionable() {
        assert!(has_actionable_content("# Tasks\ncheck the deploy\n"));
    }

    #[test]
    fn checkboxes_are_actionable_even_under_headers_only() {
        assert!(has_actionable_content("# Tasks\n- [ ] water plants\n"));
        assert!(has_actionable_content("- [x] already done\n"));
    }

    fn handler(replies: Arc<Mutex<Vec<String>>>, reply: &str) -> HeartbeatHandler {
        let reply = reply.to_string();
        Arc::new(move |prompt: String| {
            let replies = replies.clone();
            let reply = reply.clone();
            Box::pin(async move {
                replies.lock().unwrap().push(prompt);
                Ok(reply)
            })
        })
    }

    #[tokio::test]
    async fn tick_skips_when_file_missing_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
        let service = HeartbeatService::new(
            dir.path().to_path_buf(),
            1800,
            handler(calls.clone(), "HEARTBEAT_OK"),
        );

        service.tick().await;
        std::fs::write(dir.path().join("HEARTBEAT.md"), "# Tasks\n\n").unwrap();
        service.tick().await;
        assert!(calls.lock().unwrap().is_empty(), "handler must not run");
    }

    #[tokio::test]
    async fn tick_invokes_handler_on_actionable_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("HEARTBEAT.md"), "# Tasks\n- [ ] X\n").unwrap();
        let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
        let service = HeartbeatService::new(
            dir.path().to_path_buf(),
            1800,
            handler(calls.clone(), "HEART_BEAT_OK all quiet"),
        );

        service.tick().await;
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], HEARTBEAT_PROMPT);
    }

    #[tokio::test]
    async fn stop_before_first_tick_cancels_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("HEARTBEAT.md"), "- [ ] never run\n").unwrap();
        let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(vec![]));
        let service = Arc::new(HeartbeatService::new(
            dir.path().to_path_buf(),
            3600,
            handler(calls.clone(), "ok"),
        ));

        service.start().await;
        service.stop().await;
        assert!(calls.lock().unwrap().is_empty());
    }
}
