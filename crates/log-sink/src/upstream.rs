// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use core::time::Duration;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::error::Error;
use std::time::Instant;
use tracing::{debug, error};

use crate::http_utils::build_client;
use crate::payload::LogPayload;
use crate::retry::{classify_status, classify_transport_error, Outcome};

/// Sends one payload to the upstream collector. One call is one attempt: retries belong to the
/// dispatcher.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(&self, payload: &LogPayload, token: &str, timeout: Duration) -> Outcome;
}

#[derive(Debug, Clone)]
pub struct HttpUpstreamClient {
    client: reqwest::Client,
    target_url: String,
}

impl HttpUpstreamClient {
    pub fn new(target_url: String, proxy_url: Option<&str>) -> Self {
        let client = build_client(proxy_url).unwrap_or_else(|e| {
            error!(
                "Unable to parse proxy configuration: {}, no proxy will be used",
                e
            );
            reqwest::Client::new()
        });
        HttpUpstreamClient { client, target_url }
    }

    pub fn try_new(target_url: String, proxy_url: Option<&str>) -> Result<Self, Box<dyn Error>> {
        Ok(HttpUpstreamClient {
            client: build_client(proxy_url)?,
            target_url,
        })
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    fn create_request(
        &self,
        payload: &LogPayload,
        token: &str,
        timeout: Duration,
    ) -> Result<reqwest::RequestBuilder, Outcome> {
        let mut headers = HeaderMap::new();
        let authorization = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            Outcome::TransientFailure(format!("token is not a valid header value: {e}"))
        })?;
        headers.insert(AUTHORIZATION, authorization);
        let content_type = HeaderValue::from_str(payload.content_type()).map_err(|e| {
            Outcome::NonRetriableFailure(format!("content type is not a valid header value: {e}"))
        })?;
        headers.insert(CONTENT_TYPE, content_type);

        Ok(self
            .client
            .post(&self.target_url)
            .headers(headers)
            .timeout(timeout)
            .body(payload.body().clone()))
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn send(&self, payload: &LogPayload, token: &str, timeout: Duration) -> Outcome {
        let request = match self.create_request(payload, token, timeout) {
            Ok(request) => request,
            Err(outcome) => return outcome,
        };

        let time = Instant::now();
        let response = request.send().await;
        let elapsed = time.elapsed();

        match response {
            Ok(r) => {
                let status = r.status();
                let outcome = classify_status(status);
                if outcome.is_success() {
                    debug!(
                        "Upstream | Sent {} bytes in {} ms to {}",
                        payload.len(),
                        elapsed.as_millis(),
                        self.target_url
                    );
                } else {
                    let body = r.text().await.unwrap_or_default();
                    debug!("Upstream | Request failed with status {status}: {body:?}");
                }
                outcome
            }
            Err(e) => {
                debug!(
                    "Upstream | Network error after {} ms: {:?}",
                    elapsed.as_millis(),
                    e
                );
                classify_transport_error(&e)
            }
        }
    }
}
