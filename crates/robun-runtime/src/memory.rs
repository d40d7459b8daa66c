//! The two long-term memory artifacts per workspace: `MEMORY.md`
//! (distilled durable facts, overwritten whole) and `HISTORY.md`
//! (append-only dated summaries).

use std::path::{Path, PathBuf};

use robun_core::Result;

pub struct MemoryStore {
    dir: PathBuf,
}

impl MemoryStore {
    pub fn new(workspace: &Path) -> Self {
        Self {
            dir: workspace.join("memory"),
        }
    }

    pub fn memory_path(&self) -> PathBuf {
        self.dir.join("MEMORY.md")
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join("HISTORY.md")
    }

    /// Current long-term memory; empty string when the file does not exist.
    pub async fn read_memory(&self) -> String {
        tokio::fs::read_to_string(self.memory_path())
            .await
            .unwrap_or_default()
    }

    /// Overwrite the whole long-term memory file.
    pub async fn write_memory(&self, content: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.memory_path(), content).await?;
        Ok(())
    }

    pub async fn read_history(&self) -> String {
        tokio::fs::read_to_string(self.history_path())
            .await
            .unwrap_or_default()
    }

    /// Append one summary entry followed by a blank line.
    pub async fn append_history(&self, entry: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut current = self.read_history().await;
        current.push_str(entry.trim_end());
        current.push_str("\n\n");
        tokio::fs::write(self.history_path(), current).await?;
        Ok(())
    }
}
