// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Configuration module
//!
//! Provider configurations, the persisted settings document, and the
//! key/value configuration store.

pub mod provider;
pub mod settings;
pub mod store;

pub use provider::{AiProvider, ProviderConfiguration};
pub use settings::{SessionOptions, SettingsDocument};
pub use store::{ConfigurationStore, ConfigurationStoreExt, JsonConfigurationStore};
