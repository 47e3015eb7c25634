// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use aider_session::conversation::{
    ChatMessage, Conversation, ConversationStore, FileConversationStore, MessageReference,
};
use aider_session::AiderError;
use tempfile::TempDir;

fn conversation(id: &str, messages: &[&str]) -> Conversation {
    let mut conversation = Conversation::new(id, "Refactoring session");
    for text in messages {
        conversation.push(ChatMessage::user(*text));
    }
    conversation
}

#[tokio::test]
async fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let store = FileConversationStore::new(dir.path());

    let mut original = conversation("current", &["hello"]);
    original.push(
        ChatMessage::assistant("hi there")
            .with_model("gpt-4o")
            .with_references(vec![MessageReference::file("src/lib.rs")]),
    );
    store.save_conversation(&original).await.unwrap();

    let loaded = store.load_conversation("current").await.unwrap().unwrap();
    assert_eq!(loaded.id, "current");
    assert_eq!(loaded.messages.len(), 2);
    assert_eq!(loaded.messages[1].model_used.as_deref(), Some("gpt-4o"));
    assert_eq!(loaded.messages[1].references.len(), 1);
    assert_eq!(loaded.messages[0].id, original.messages[0].id);
}

#[tokio::test]
async fn test_load_missing_returns_none() {
    let dir = TempDir::new().unwrap();
    let store = FileConversationStore::new(dir.path());
    assert!(store.load_conversation("current").await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_id_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = FileConversationStore::new(dir.path());

    assert!(matches!(
        store.load_conversation("  ").await,
        Err(AiderError::InvalidInput(_))
    ));
    assert!(matches!(
        store.save_conversation(&conversation("", &[])).await,
        Err(AiderError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_archive_moves_live_file() {
    let dir = TempDir::new().unwrap();
    let store = FileConversationStore::new(dir.path());
    store
        .save_conversation(&conversation("current", &["hello"]))
        .await
        .unwrap();

    assert!(store
        .archive_conversation("current", "archive_20250101_120000")
        .await
        .unwrap());

    assert!(store.load_conversation("current").await.unwrap().is_none());
    assert_eq!(store.archived_files().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_archive_without_live_file() {
    let dir = TempDir::new().unwrap();
    let store = FileConversationStore::new(dir.path());

    assert!(!store
        .archive_conversation("current", "nothing-here")
        .await
        .unwrap());
    assert!(matches!(
        store.archive_conversation("current", " ").await,
        Err(AiderError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_archive_name_is_sanitized() {
    let dir = TempDir::new().unwrap();
    let store = FileConversationStore::new(dir.path());
    store
        .save_conversation(&conversation("current", &["hello"]))
        .await
        .unwrap();

    store
        .archive_conversation("current", "../escape attempt")
        .await
        .unwrap();

    let files = store.archived_files().await.unwrap();
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(!name.contains('/'));
    assert!(!name.contains(' '));
    assert!(files[0].starts_with(dir.path()));
}

#[tokio::test]
async fn test_summaries_most_recent_first() {
    let dir = TempDir::new().unwrap();
    let store = FileConversationStore::new(dir.path());

    store
        .save_conversation(&conversation("older", &["one"]))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    store
        .save_conversation(&conversation("newer", &["one", "two"]))
        .await
        .unwrap();

    let summaries = store.conversation_summaries().await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].id, "newer");
    assert_eq!(summaries[0].message_count, 2);
    assert_eq!(summaries[0].preview.as_deref(), Some("two"));
    assert_eq!(summaries[1].id, "older");
}

#[tokio::test]
async fn test_delete_conversation() {
    let dir = TempDir::new().unwrap();
    let store = FileConversationStore::new(dir.path());
    store
        .save_conversation(&conversation("current", &["hello"]))
        .await
        .unwrap();

    assert!(store.delete_conversation("current").await.unwrap());
    assert!(!store.delete_conversation("current").await.unwrap());
    assert!(store.conversation_summaries().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cleanup_older_than() {
    let dir = TempDir::new().unwrap();
    let store = FileConversationStore::new(dir.path());

    let mut stale = conversation("stale", &["old"]);
    stale.last_modified = chrono::Utc::now() - chrono::Duration::days(45);
    store.save_conversation(&stale).await.unwrap();
    store
        .save_conversation(&conversation("fresh", &["new"]))
        .await
        .unwrap();

    let removed = store
        .cleanup_older_than(chrono::Duration::days(30))
        .await
        .unwrap();

    assert_eq!(removed, 1);
    assert!(store.load_conversation("stale").await.unwrap().is_none());
    assert!(store.load_conversation("fresh").await.unwrap().is_some());
}
