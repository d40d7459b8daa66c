//! Composes the system prompt and the ordered message list for one LLM
//! turn: identity, workspace bootstrap files, long-term memory, active
//! skills, skills summary, then the history window and the current user
//! content (with image parts when the event carried media).

use std::path::{Path, PathBuf};

use base64::Engine;
use chrono::Utc;
use tracing::debug;

use robun_core::{Role, SessionMessage};
use robun_llm::{ChatMessage, ContentPart, ImageUrl};

use crate::skills::SkillSet;

/// Workspace files injected verbatim into the system prompt when present.
pub const BOOTSTRAP_FILES: [&str; 5] =
    ["AGENTS.md", "SOUL.md", "USER.md", "TOOLS.md", "IDENTITY.md"];

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

pub struct ContextBuilder {
    workspace: PathBuf,
}

impl ContextBuilder {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Assemble the system prompt sections, joined by `\n\n---\n\n`.
    pub async fn system_prompt(
        &self,
        memory: &str,
        skills: &SkillSet,
        requested_skills: &[String],
    ) -> String {
        let mut sections = Vec::new();

        sections.push(format!(
            "You are robun, an AI assistant.\nCurrent time: {} UTC\nOS: {}\nWorkspace: {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            std::env::consts::OS,
            self.workspace.display(),
        ));

        for name in BOOTSTRAP_FILES {
            let path = self.workspace.join(name);
            if let Ok(content) = tokio::fs::read_to_string(&path).await {
                let trimmed = content.trim();
                if !trimmed.is_empty() {
                    sections.push(format!("## {name}\n\n{trimmed}"));
                }
            }
        }

        if !memory.trim().is_empty() {
            sections.push(format!("## Long-term Memory\n\n{}", memory.trim()));
        }

        let active = skills.active(requested_skills);
        if !active.is_empty() {
            let rendered: Vec<String> = active
                .iter()
                .map(|s| format!("### Skill: {}\n\n{}", s.name, s.body))
                .collect();
            sections.push(rendered.join("\n\n"));
        }

        if let Some(xml) = skills.summary_xml() {
            sections.push(xml);
        }

        sections.join(SECTION_SEPARATOR)
    }

    /// `[system] + history window + [user]`. History is the last
    /// `memory_window` transcript messages projected to role/content.
    pub async fn build_messages(
        &self,
        system_prompt: String,
        history: &[SessionMessage],
        content: &str,
        media: &[PathBuf],
        memory_window: usize,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system_prompt));

        let start = history.len().saturating_sub(memory_window);
        for entry in &history[start..] {
            messages.push(ChatMessage::text(entry.role, entry.content.clone()));
        }

        messages.push(self.user_message(content, media).await);
        messages
    }

    /// The current user message; media paths become image-url data parts.
    async fn user_message(&self, content: &str, media: &[PathBuf]) -> ChatMessage {
        if media.is_empty() {
            return ChatMessage::user(content);
        }

        let mut parts = vec![ContentPart::Text {
            text: content.to_string(),
        }];
        for path in media {
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
                    parts.push(ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:{};base64,{encoded}", mime_for(path)),
                        },
                    });
                }
                // Unreadable media is dropped without failing the turn.
                Err(e) => debug!(?path, error = %e, "skipping unreadable media file"),
            }
        }

        if parts.len() == 1 {
            ChatMessage::user(content)
        } else {
            ChatMessage::user_parts(parts)
        }
    }
}

/// Infer an image MIME type from the file extension.
fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}
