// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat message and conversation types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum message length, in characters
pub const MAX_CONTENT_CHARS: usize = 50_000;
/// Maximum conversation title length, in characters
pub const MAX_TITLE_CHARS: usize = 500;

const PREVIEW_CHARS: usize = 100;

/// Who authored a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    Assistant,
    System,
}

/// What a reference points at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    /// A whole file
    File,
    /// A line range within a file
    Selection,
    /// Clipboard text
    Clipboard,
}

/// A file, selection, or clipboard reference attached to a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageReference {
    pub kind: ReferenceKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    /// First line, 1-based
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,

    /// Last line, inclusive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl MessageReference {
    /// Reference a whole file
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            kind: ReferenceKind::File,
            file_path: Some(path.into()),
            start_line: None,
            end_line: None,
            content: None,
        }
    }

    /// Reference a line range
    pub fn selection(
        path: impl Into<String>,
        start_line: u32,
        end_line: u32,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: ReferenceKind::Selection,
            file_path: Some(path.into()),
            start_line: Some(start_line),
            end_line: Some(end_line),
            content: Some(content.into()),
        }
    }

    /// Reference clipboard text
    pub fn clipboard(content: impl Into<String>) -> Self {
        Self {
            kind: ReferenceKind::Clipboard,
            file_path: None,
            start_line: None,
            end_line: None,
            content: Some(content.into()),
        }
    }

    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match self.kind {
            ReferenceKind::File | ReferenceKind::Selection => {
                if is_blank(self.file_path.as_deref()) {
                    errors.push("File path is required".to_string());
                }
            }
            ReferenceKind::Clipboard => {
                if is_blank(self.content.as_deref()) {
                    errors.push("Clipboard content is required".to_string());
                }
            }
        }

        if self.kind == ReferenceKind::Selection {
            match (self.start_line, self.end_line) {
                (Some(start), Some(end)) if start >= 1 && start <= end => {}
                _ => errors.push("Selection line range is invalid".to_string()),
            }
        }

        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validation_errors().is_empty()
    }
}

/// A message in a session conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,

    pub content: String,

    #[serde(rename = "type")]
    pub message_type: MessageType,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<MessageReference>,

    /// Model that produced an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,

    /// Outbound message this one answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
}

impl ChatMessage {
    fn new(message_type: MessageType, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            message_type,
            timestamp: Utc::now(),
            references: Vec::new(),
            model_used: None,
            reply_to: None,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageType::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageType::Assistant, content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageType::System, content)
    }

    pub fn with_references(mut self, references: Vec<MessageReference>) -> Self {
        self.references = references;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_used = Some(model.into());
        self
    }

    pub fn in_reply_to(mut self, id: Uuid) -> Self {
        self.reply_to = Some(id);
        self
    }

    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.content.trim().is_empty() {
            errors.push("Message content is required".to_string());
        } else if self.content.chars().count() > MAX_CONTENT_CHARS {
            errors.push(format!(
                "Message content cannot exceed {} characters",
                MAX_CONTENT_CHARS
            ));
        }

        if self.timestamp == DateTime::<Utc>::default() {
            errors.push("Message timestamp is required".to_string());
        }

        for (index, reference) in self.references.iter().enumerate() {
            for error in reference.validation_errors() {
                errors.push(format!("Reference {}: {}", index + 1, error));
            }
        }

        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validation_errors().is_empty()
    }
}

/// A persisted conversation record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            created_at: now,
            last_modified: now,
            messages: Vec::new(),
        }
    }

    /// Append a message and bump `last_modified`
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.touch();
    }

    /// Remove a message by id and bump `last_modified`
    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        let removed = self.messages.len() < before;
        if removed {
            self.touch();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.touch();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn touch(&mut self) {
        self.last_modified = Utc::now();
    }

    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.id.trim().is_empty() {
            errors.push("Conversation id is required".to_string());
        }
        if self.title.chars().count() > MAX_TITLE_CHARS {
            errors.push(format!(
                "Conversation title cannot exceed {} characters",
                MAX_TITLE_CHARS
            ));
        }
        errors
    }

    /// Summary row for listing
    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            message_count: self.messages.len(),
            created_at: self.created_at,
            last_modified: self.last_modified,
            preview: self.messages.last().map(|m| preview(&m.content)),
        }
    }
}

/// Listing entry for a stored conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// Start of the last message
    pub preview: Option<String>,
}

fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let truncated: String = content.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{}...", truncated)
    } else {
        content.to_string()
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}
