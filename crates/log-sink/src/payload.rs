// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;

/// Content type assumed when ingress did not carry one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// One submission accepted at ingress, forwarded upstream as-is.
///
/// The body is reference counted, so cloning a payload for each attempt never copies the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPayload {
    body: Bytes,
    content_type: Option<String>,
}

impl LogPayload {
    pub fn new(body: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            body: body.into(),
            content_type,
        }
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Content type as received, falling back to [`DEFAULT_CONTENT_TYPE`].
    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}
