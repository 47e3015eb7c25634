// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider layer
//!
//! Provider transports, the dispatch table that selects one per
//! configuration, and the catalog that owns the active model.

pub mod catalog;
pub mod known_models;
pub mod mock_provider;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod retry;

pub use catalog::ProviderCatalog;
pub use mock_provider::{MockFailure, MockOutcome, MockProvider};
pub use provider::*;
pub use registry::{ProviderRegistry, TransportFactory};
pub use retry::Backoff;
