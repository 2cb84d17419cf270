// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::TokenError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::{future::Future, pin::Pin};

pub type TokenResolverFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<String, TokenError>> + Send>> + Send + Sync>;

/// Supplies the bearer token attached to each upstream attempt.
///
/// Called once per attempt and shared by every in-flight delivery, so implementations must be
/// cheap and safe to call concurrently. Any caching or refreshing happens behind this call.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, TokenError>;
}

#[derive(Clone)]
pub enum TokenFactory {
    Static(String),
    /// Re-read on every call, so a token rotated on disk is picked up by the next attempt.
    File(PathBuf),
    Dynamic(TokenResolverFn),
}

impl TokenFactory {
    pub fn new_from_static_token(token: &str) -> Self {
        Self::Static(token.to_string())
    }

    pub fn new_from_file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn new_from_resolver(resolver_fn: TokenResolverFn) -> Self {
        Self::Dynamic(resolver_fn)
    }
}

#[async_trait]
impl TokenSource for TokenFactory {
    async fn token(&self) -> Result<String, TokenError> {
        let token = match self {
            Self::Static(token) => token.clone(),
            Self::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|source| TokenError::File {
                    path: path.display().to_string(),
                    source,
                })?
                .trim()
                .to_string(),
            Self::Dynamic(resolver_fn) => (resolver_fn)().await?,
        };
        if token.is_empty() {
            return Err(TokenError::Empty);
        }
        Ok(token)
    }
}

impl Debug for TokenFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(_) => write!(f, "TokenFactory::Static"),
            Self::File(path) => write!(f, "TokenFactory::File({})", path.display()),
            Self::Dynamic(_) => write!(f, "TokenFactory::Dynamic"),
        }
    }
}
