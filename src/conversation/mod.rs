// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation records and their persistence

pub mod message;
pub mod store;

pub use message::{
    ChatMessage, Conversation, ConversationSummary, MessageReference, MessageType, ReferenceKind,
};
pub use store::{ConversationStore, FileConversationStore};
