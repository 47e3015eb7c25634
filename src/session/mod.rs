// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Aider session
//!
//! The backend transport, connection state, and [`SessionService`], which
//! queues user messages and delivers them one at a time.

pub mod envelope;
pub mod mock_backend;
pub mod service;
pub mod state;
pub mod transport;

pub use envelope::DeliveryPolicy;
pub use mock_backend::{MockBackend, MockReply};
pub use service::{SessionService, SessionServiceBuilder};
pub use state::ConnectionStatus;
pub use transport::{BackendTransport, HttpBackendTransport, InboundMessage, OutboundMessage};
