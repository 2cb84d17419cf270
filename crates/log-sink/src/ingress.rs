// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{header, http, Method, Request, StatusCode};
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::dispatcher::{DispatchStatus, Dispatcher};
use crate::error::IngressError;
use crate::http_utils::{
    create_unauthorized_http_response, log_and_create_http_response,
    verify_request_content_length, HttpResponse,
};
use crate::payload::LogPayload;

pub const INSTANCE_LOGS_ENDPOINT_PATH: &str = "/instance-logs";
const AUTH_REALM: &str = "log-sink";

/// Username and password callers must present with HTTP basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Checks an `Authorization` header value of the form `Basic base64(user:password)`.
    pub fn matches(&self, authorization: &str) -> bool {
        let Some(encoded) = authorization
            .strip_prefix("Basic ")
            .or_else(|| authorization.strip_prefix("basic "))
        else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((username, password)) => {
                // Both halves are always compared so timing does not reveal which one failed.
                digests_match(username, &self.username) & digests_match(password, &self.password)
            }
            None => false,
        }
    }
}

/// Compares SHA-256 digests of both values without short-circuiting on the first differing byte.
fn digests_match(candidate: &str, expected: &str) -> bool {
    let candidate = Sha256::digest(candidate.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    candidate
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

impl Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BasicCredentials({})", self.username)
    }
}

#[derive(Debug, Clone)]
pub struct IngressConfig {
    pub host: String,
    pub port: u16,
    pub credentials: BasicCredentials,
    pub max_content_length: usize,
}

/// HTTP front door: authenticates callers, hands bodies to the [`Dispatcher`] and answers
/// `201 Created` straight away, whatever later happens upstream.
pub struct Ingress {
    pub config: Arc<IngressConfig>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Ingress {
    pub fn new(config: IngressConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher,
        }
    }

    pub async fn bind(&self) -> Result<TcpListener, IngressError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        TcpListener::bind(&addr)
            .await
            .map_err(|source| IngressError::Bind { addr, source })
    }

    /// Binds the configured address and serves until `shutdown` is cancelled.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<(), IngressError> {
        let listener = self.bind().await?;
        debug!(
            "Ingress started: listening on {}",
            listener
                .local_addr()
                .map_or_else(|_| "unknown address".to_string(), |addr| addr.to_string())
        );
        self.serve(listener, shutdown).await
    }

    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), IngressError> {
        let config = Arc::clone(&self.config);
        let dispatcher = Arc::clone(&self.dispatcher);
        let service = service_fn(move |req| {
            let config = Arc::clone(&config);
            let dispatcher = Arc::clone(&dispatcher);
            Ingress::endpoint_handler(config, dispatcher, req)
        });

        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Ingress | Shutdown requested, no longer accepting connections");
                    return Ok(());
                },
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Ingress | Server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    error!("Ingress | Connection error: {e}");
                }
            });
        }
    }

    async fn endpoint_handler(
        config: Arc<IngressConfig>,
        dispatcher: Arc<Dispatcher>,
        req: Request<Incoming>,
    ) -> http::Result<HttpResponse> {
        let authorized = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| config.credentials.matches(value));
        if !authorized {
            return create_unauthorized_http_response(AUTH_REALM);
        }

        match (req.method(), req.uri().path()) {
            (&Method::POST, INSTANCE_LOGS_ENDPOINT_PATH) => {
                Self::accept_instance_logs(&config, &dispatcher, req).await
            }
            (_, INSTANCE_LOGS_ENDPOINT_PATH) => log_and_create_http_response(
                "Instance logs endpoint only accepts POST requests",
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (_, path) => log_and_create_http_response(
                &format!("No handler for path {path}"),
                StatusCode::NOT_FOUND,
            ),
        }
    }

    async fn accept_instance_logs(
        config: &IngressConfig,
        dispatcher: &Dispatcher,
        req: Request<Incoming>,
    ) -> http::Result<HttpResponse> {
        if let Some(response) = verify_request_content_length(
            req.headers(),
            config.max_content_length,
            "Error processing instance logs",
        ) {
            return response;
        }

        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        // Chunked bodies carry no Content-Length, so the limit is enforced while reading.
        let body = Limited::new(req.into_body(), config.max_content_length);
        let body: Bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                return log_and_create_http_response(
                    "Error processing instance logs: Payload too large",
                    StatusCode::PAYLOAD_TOO_LARGE,
                )
            }
            Err(e) => {
                return log_and_create_http_response(
                    &format!("Error reading instance logs body: {e}"),
                    StatusCode::BAD_REQUEST,
                )
            }
        };
        if body.is_empty() {
            return log_and_create_http_response(
                "Error processing instance logs: Empty request body",
                StatusCode::BAD_REQUEST,
            );
        }

        let size = body.len();
        let status = dispatcher.dispatch(LogPayload::new(body, content_type));
        let message = match status {
            DispatchStatus::Queued => format!("Accepted {size} bytes of instance logs"),
            DispatchStatus::Rejected => {
                format!("Accepted {size} bytes of instance logs, dropped by dispatcher")
            }
        };
        log_and_create_http_response(&message, StatusCode::CREATED)
    }
}
