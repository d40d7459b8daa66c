//! The `cron` tool: a thin adapter over the cron service so the agent can
//! schedule, inspect, and remove its own jobs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{Value, json};

use robun_core::Result;

use super::{Tool, ToolContext};
use crate::cron::{CronPayloadKind, CronSchedule, CronService, NewCronJob};

pub struct CronTool {
    service: Arc<CronService>,
}

impl CronTool {
    pub fn new(service: Arc<CronService>) -> Self {
        Self { service }
    }

    async fn add(&self, ctx: &ToolContext, args: &Value) -> Result<String> {
        let Some(message) = args["message"].as_str().filter(|m| !m.is_empty()) else {
            return Ok("Error: 'message' is required for action=add".into());
        };
        let name = args["name"].as_str().unwrap_or(message).to_string();

        let schedule = if let Some(every) = args["every_seconds"].as_i64() {
            CronSchedule::Every {
                every_ms: every * 1000,
            }
        } else if let Some(expr) = args["cron"].as_str() {
            CronSchedule::Cron {
                expr: expr.to_string(),
                tz: args["tz"].as_str().map(str::to_string),
            }
        } else if let Some(at_ms) = args["at_ms"].as_i64() {
            CronSchedule::At { at_ms }
        } else {
            return Ok(
                "Error: provide one of 'every_seconds', 'cron', or 'at_ms' for action=add".into(),
            );
        };
        let delete_after_run = args["delete_after_run"].as_bool().unwrap_or(false)
            && matches!(schedule, CronSchedule::At { .. });

        let job = match self
            .service
            .add_job(NewCronJob {
                name,
                schedule,
                message: message.to_string(),
                deliver: args["deliver"].as_bool().unwrap_or(true),
                channel: ctx.channel.clone(),
                to: ctx.chat_id.clone(),
                kind: CronPayloadKind::AgentTurn,
                delete_after_run,
            })
            .await
        {
            Ok(job) => job,
            Err(e) => return Ok(format!("Error: {e}")),
        };

        Ok(format!(
            "Scheduled job '{}' (id: {}). Next run: {}",
            job.name,
            job.id,
            format_ms(job.state.next_run_at_ms)
        ))
    }

    async fn list(&self) -> Result<String> {
        let jobs = self.service.list_jobs(false).await;
        if jobs.is_empty() {
            return Ok("No scheduled jobs.".into());
        }
        let lines: Vec<String> = jobs
            .iter()
            .map(|job| {
                format!(
                    "- {} (id: {}) — next run: {} — {}",
                    job.name,
                    job.id,
                    format_ms(job.state.next_run_at_ms),
                    job.payload.message,
                )
            })
            .collect();
        Ok(format!("Scheduled jobs:\n{}", lines.join("\n")))
    }

    async fn remove(&self, args: &Value) -> Result<String> {
        let Some(id) = args["job_id"].as_str() else {
            return Ok("Error: 'job_id' is required for action=remove".into());
        };
        match self.service.remove_job(id).await {
            Ok(true) => Ok(format!("Removed job {id}")),
            Ok(false) => Ok(format!("Error: job not found: {id}")),
            Err(e) => Ok(format!("Error: {e}")),
        }
    }
}

fn format_ms(ms: Option<i64>) -> String {
    match ms.and_then(DateTime::from_timestamp_millis) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "never".into(),
    }
}

#[async_trait]
impl Tool for CronTool {
    fn name(&self) -> &str {
        "cron"
    }

    fn description(&self) -> &str {
        "Manage scheduled jobs: add a reminder or recurring task, list jobs, or remove one"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["add", "list", "remove"] },
                "message": { "type": "string", "description": "For add: the message the agent processes when the job fires" },
                "name": { "type": "string", "description": "For add: human-readable job name" },
                "every_seconds": { "type": "integer", "description": "For add: recurring interval in seconds" },
                "cron": { "type": "string", "description": "For add: 5-field cron expression" },
                "at_ms": { "type": "integer", "description": "For add: one-shot epoch milliseconds" },
                "delete_after_run": { "type": "boolean", "description": "For add with at_ms: drop the job after it fires" },
                "deliver": { "type": "boolean", "description": "For add: deliver the reply to this chat (default true)" },
                "job_id": { "type": "string", "description": "For remove: job id" }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: &Value) -> Result<String> {
        match args["action"].as_str().unwrap_or_default() {
            "add" => self.add(ctx, args).await,
            "list" => self.list().await,
            "remove" => self.remove(args).await,
            other => Ok(format!("Error: unknown action '{other}'")),
        }
    }
}
