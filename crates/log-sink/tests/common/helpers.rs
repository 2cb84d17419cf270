// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Frame};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use log_sink::{
    Backoff, BasicCredentials, Dispatcher, DispatcherConfig, HttpUpstreamClient, Ingress,
    IngressConfig, RetryPolicy, TokenFactory, TokenSource, UpstreamClient,
};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::mock_server::{MockServer, ReceivedRequest};

pub const CORRECT_USER: &str = "it-user";
pub const CORRECT_PASSWORD: &str = "t0p5ecr3t";
pub const TOKEN: &str = "1234567890";
pub const UPSTREAM_PATH: &str = "/api/instance-logs";

pub fn test_payload() -> &'static str {
    r#"{"foo":"bar","an_integer":5,"complex_inner_type":{"hello":"World"}}"#
}

pub fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

/// Dispatcher forwarding to the mock server with a static token and immediate retries.
pub fn create_dispatcher(
    server: &MockServer,
    max_attempts: u32,
    max_in_flight: usize,
) -> Arc<Dispatcher> {
    create_dispatcher_with_queue(server, max_attempts, max_in_flight, 64)
}

pub fn create_dispatcher_with_queue(
    server: &MockServer,
    max_attempts: u32,
    max_in_flight: usize,
    queue_capacity: usize,
) -> Arc<Dispatcher> {
    let client: Arc<dyn UpstreamClient> = Arc::new(HttpUpstreamClient::new(
        format!("{}{UPSTREAM_PATH}", server.url()),
        None,
    ));
    let tokens: Arc<dyn TokenSource> = Arc::new(TokenFactory::new_from_static_token(TOKEN));
    Arc::new(Dispatcher::new(
        DispatcherConfig {
            max_in_flight,
            queue_capacity,
            retry_policy: RetryPolicy::new(
                max_attempts,
                Duration::from_secs(2),
                Backoff::Immediate,
            ),
        },
        client,
        tokens,
    ))
}

/// Starts an ingress on a random port in front of the given dispatcher.
pub async fn start_ingress(dispatcher: Arc<Dispatcher>) -> (SocketAddr, CancellationToken) {
    start_ingress_with_limit(dispatcher, 1024 * 1024).await
}

pub async fn start_ingress_with_limit(
    dispatcher: Arc<Dispatcher>,
    max_content_length: usize,
) -> (SocketAddr, CancellationToken) {
    let ingress = Ingress::new(
        IngressConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            credentials: BasicCredentials::new(CORRECT_USER, CORRECT_PASSWORD),
            max_content_length,
        },
        dispatcher,
    );
    let listener = ingress.bind().await.expect("Failed to bind ingress");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        ingress
            .serve(listener, shutdown)
            .await
            .expect("ingress failed");
    });
    (addr, cancel)
}

/// Send an HTTP request over TCP and return the response
pub async fn send_tcp_request(
    addr: SocketAddr,
    uri: &str,
    method: &str,
    authorization: Option<&str>,
    body: Option<Vec<u8>>,
) -> Result<Response<hyper::body::Incoming>, Box<dyn std::error::Error>> {
    let stream = timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr)).await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut request_builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Host", addr.to_string())
        .header("Content-Type", "application/json");
    if let Some(authorization) = authorization {
        request_builder = request_builder.header("Authorization", authorization);
    }

    let response = if let Some(body_data) = body {
        let body_len = body_data.len();
        request_builder = request_builder.header("Content-Length", body_len.to_string());
        let request = request_builder.body(Full::new(Bytes::from(body_data)))?;
        timeout(Duration::from_secs(2), sender.send_request(request)).await??
    } else {
        let request = request_builder.body(Full::new(Bytes::new()))?;
        timeout(Duration::from_secs(2), sender.send_request(request)).await??
    };

    Ok(response)
}

/// Request body of unknown size, so hyper sends it with `Transfer-Encoding: chunked`.
pub struct ChunkedBody {
    chunks: VecDeque<Bytes>,
}

impl ChunkedBody {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into_iter().map(Bytes::from).collect(),
        }
    }
}

impl Body for ChunkedBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.get_mut().chunks.pop_front().map(|c| Ok(Frame::data(c))))
    }
}

/// Sends an authenticated chunked POST to the instance logs endpoint
pub async fn send_chunked_request(
    addr: SocketAddr,
    chunks: Vec<Vec<u8>>,
) -> Result<Response<hyper::body::Incoming>, Box<dyn std::error::Error>> {
    let stream = timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr)).await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let request = Request::builder()
        .uri("/instance-logs")
        .method("POST")
        .header("Host", addr.to_string())
        .header("Content-Type", "application/json")
        .header("Authorization", basic_auth(CORRECT_USER, CORRECT_PASSWORD))
        .body(ChunkedBody::new(chunks))?;
    Ok(timeout(Duration::from_secs(2), sender.send_request(request)).await??)
}

pub async fn response_body(response: Response<hyper::body::Incoming>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Waits until the mock server has seen `count` requests on `path`, failing after 5 seconds.
pub async fn wait_for_requests(
    server: &MockServer,
    path: &str,
    count: usize,
) -> Vec<ReceivedRequest> {
    let wait = async {
        loop {
            let requests = server.get_requests_for_path(path);
            if requests.len() >= count {
                return requests;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for upstream requests")
}

/// Waits until the dispatcher has finished `count` delivery loops, failing after 5 seconds.
pub async fn wait_until_finished(dispatcher: &Dispatcher, count: u64) {
    let wait = async {
        while dispatcher.stats().finished() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for deliveries to finish");
}
