// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation persistence
//!
//! Stores each live conversation as a JSON file, with archives in a
//! sibling directory.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};

use super::message::{Conversation, ConversationSummary};
use crate::config::SettingsDocument;
use crate::error::{AiderError, Result};

/// Durable storage for conversations.
///
/// "Not found" is never an error: lookups return `None`, removals `false`.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Write (or overwrite) the conversation under its id
    async fn save_conversation(&self, conversation: &Conversation) -> Result<()>;

    /// Load a live conversation
    async fn load_conversation(&self, id: &str) -> Result<Option<Conversation>>;

    /// Move a live conversation into the archive under `name`
    async fn archive_conversation(&self, id: &str, name: &str) -> Result<bool>;

    /// Summaries of live conversations, most recently modified first
    async fn conversation_summaries(&self) -> Result<Vec<ConversationSummary>>;

    /// Delete a live conversation
    async fn delete_conversation(&self, id: &str) -> Result<bool>;

    /// Delete live conversations last modified before now - `age`
    async fn cleanup_older_than(&self, age: chrono::Duration) -> Result<usize>;
}

/// Filesystem-based conversation store
pub struct FileConversationStore {
    /// Directory for live conversations
    live_dir: PathBuf,
    /// Directory for archived conversations
    archive_dir: PathBuf,
}

impl FileConversationStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            live_dir: root.join("conversations"),
            archive_dir: root.join("archive"),
        }
    }

    /// Store under the default settings home
    pub fn open_default() -> Self {
        Self::new(SettingsDocument::home())
    }

    fn live_path(&self, id: &str) -> PathBuf {
        self.live_dir.join(format!("{}.json", sanitize(id)))
    }

    fn archive_path(&self, id: &str, name: &str) -> PathBuf {
        self.archive_dir
            .join(format!("{}__{}.json", sanitize(id), sanitize(name)))
    }

    /// Archived conversation files, for inspection
    pub async fn archived_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !tokio::fs::try_exists(&self.archive_dir).await? {
            return Ok(files);
        }

        let mut entries = tokio::fs::read_dir(&self.archive_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_json(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn read_conversation(path: &Path) -> Result<Conversation> {
        let content = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&content)
            .map_err(|e| AiderError::Storage(format!("Failed to parse {:?}: {}", path, e)))
    }

    async fn live_conversations(&self) -> Result<Vec<(PathBuf, Conversation)>> {
        let mut conversations = Vec::new();

        if !tokio::fs::try_exists(&self.live_dir).await? {
            return Ok(conversations);
        }

        let mut entries = tokio::fs::read_dir(&self.live_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_json(&path) {
                continue;
            }

            match Self::read_conversation(&path).await {
                Ok(conversation) => conversations.push((path, conversation)),
                Err(e) => {
                    tracing::warn!("Skipping unreadable conversation file {:?}: {}", path, e);
                }
            }
        }

        Ok(conversations)
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn save_conversation(&self, conversation: &Conversation) -> Result<()> {
        let errors = conversation.validation_errors();
        if !errors.is_empty() {
            return Err(AiderError::InvalidInput(errors.join("; ")));
        }

        tokio::fs::create_dir_all(&self.live_dir).await?;
        let json = serde_json::to_string_pretty(conversation)?;
        tokio::fs::write(self.live_path(&conversation.id), json).await?;
        Ok(())
    }

    async fn load_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        require_id(id)?;
        let path = self.live_path(id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        Ok(Some(Self::read_conversation(&path).await?))
    }

    async fn archive_conversation(&self, id: &str, name: &str) -> Result<bool> {
        require_id(id)?;
        if name.trim().is_empty() {
            return Err(AiderError::InvalidInput(
                "Archive name cannot be empty".to_string(),
            ));
        }

        let source = self.live_path(id);
        if !tokio::fs::try_exists(&source).await? {
            return Ok(false);
        }

        tokio::fs::create_dir_all(&self.archive_dir).await?;
        let target = self.archive_path(id, name);
        tokio::fs::copy(&source, &target).await?;
        tokio::fs::remove_file(&source).await?;
        Ok(true)
    }

    async fn conversation_summaries(&self) -> Result<Vec<ConversationSummary>> {
        let mut summaries: Vec<ConversationSummary> = self
            .live_conversations()
            .await?
            .iter()
            .map(|(_, conversation)| conversation.summary())
            .collect();
        summaries.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(summaries)
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool> {
        require_id(id)?;
        let path = self.live_path(id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(false);
        }
        tokio::fs::remove_file(path).await?;
        Ok(true)
    }

    async fn cleanup_older_than(&self, age: chrono::Duration) -> Result<usize> {
        let cutoff = Utc::now() - age;
        let mut removed = 0;

        for (path, conversation) in self.live_conversations().await? {
            if conversation.last_modified < cutoff {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

fn require_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(AiderError::InvalidInput(
            "Conversation id cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

/// Keep file names portable: anything outside [A-Za-z0-9_-] becomes '_'
fn sanitize(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("nightly"), "nightly");
        assert_eq!(sanitize("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize(" a b "), "a_b");
    }

    #[test]
    fn test_paths() {
        let store = FileConversationStore::new("/tmp/root");
        assert_eq!(
            store.live_path("current"),
            PathBuf::from("/tmp/root/conversations/current.json")
        );
        assert_eq!(
            store.archive_path("current", "nightly"),
            PathBuf::from("/tmp/root/archive/current__nightly.json")
        );
    }

    #[test]
    fn test_is_json() {
        assert!(is_json(Path::new("a.json")));
        assert!(!is_json(Path::new("a.txt")));
        assert!(!is_json(Path::new("a")));
    }
}
