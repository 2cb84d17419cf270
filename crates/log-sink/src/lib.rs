// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Accepts instance logs over HTTP and relays them, byte for byte, to a single upstream
//! collector.
//!
//! - [`ingress`]: authenticated `POST /instance-logs` endpoint answering `201 Created` at once
//! - [`dispatcher`]: bounded queue and worker slots running one delivery loop per payload
//! - [`upstream`]: one HTTP POST per attempt, with the bearer token attached
//! - [`retry`]: pure outcome classification and retry decisions
//! - [`token`]: where bearer tokens come from
//!
//! Delivery is best effort: a payload that still fails after its attempt budget is dropped.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http_utils;
pub mod ingress;
pub mod logger;
pub mod payload;
pub mod retry;
pub mod stats;
pub mod token;
pub mod upstream;

pub use config::Config;
pub use dispatcher::{DispatchStatus, Dispatcher, DispatcherConfig};
pub use error::{ConfigError, IngressError, TokenError};
pub use ingress::{BasicCredentials, Ingress, IngressConfig};
pub use payload::LogPayload;
pub use retry::{Backoff, NextAction, Outcome, RetryPolicy};
pub use token::{TokenFactory, TokenSource};
pub use upstream::{HttpUpstreamClient, UpstreamClient};
