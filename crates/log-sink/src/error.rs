// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while reading configuration from the environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Errors raised when a bearer token cannot be obtained for an attempt
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token source returned an empty token")]
    Empty,

    #[error("Failed to read token file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Token resolver failed: {0}")]
    Resolver(String),
}

/// Errors that stop the ingress server
#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error("Failed to bind ingress listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Ingress listener failed: {0}")]
    Accept(#[from] std::io::Error),
}
