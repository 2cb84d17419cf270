// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fire-and-forget forwarding of accepted payloads to the upstream collector.
//!
//! ```text
//!   dispatch()                 pump task                    delivery loops (<= max_in_flight)
//!  ───────────► [bounded queue] ──► acquire permit ──► spawn ──► token ─► send ─► classify
//!   try_send,                                                      ▲                  │
//!   reject-new on overflow                                         └── backoff ◄──────┘
//! ```
//!
//! `dispatch` only ever does a `try_send` on the queue, so the ingress path never waits on the
//! upstream. Once a payload is queued, every failure is absorbed here and only shows up in the
//! logs and in [`DeliveryStats`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::payload::LogPayload;
use crate::retry::{NextAction, Outcome, RetryPolicy};
use crate::stats::{DeliveryStats, StatsSnapshot};
use crate::token::TokenSource;
use crate::upstream::UpstreamClient;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Delivery loops allowed to run at the same time.
    pub max_in_flight: usize,
    /// Payloads allowed to wait for a free delivery slot. Anything beyond is rejected.
    pub queue_capacity: usize,
    pub retry_policy: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 16,
            queue_capacity: 1024,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// What happened to a payload handed to [`Dispatcher::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Queued,
    /// Queue full or dispatcher shut down. The payload was dropped.
    Rejected,
}

/// One attempt of one delivery loop, kept only long enough to be logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    pub number: u32,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

struct DeliveryContext {
    client: Arc<dyn UpstreamClient>,
    tokens: Arc<dyn TokenSource>,
    policy: RetryPolicy,
    stats: Arc<DeliveryStats>,
    active: AtomicUsize,
}

impl DeliveryContext {
    async fn deliver(&self, payload: LogPayload) {
        let mut number = 1;
        loop {
            let attempt = self.attempt(&payload, number).await;
            self.stats.record_attempt();

            match self.policy.next_action(number, &attempt.outcome) {
                NextAction::Done => {
                    debug!(
                        "Dispatcher | Delivered {} bytes on attempt {} in {} ms",
                        payload.len(),
                        attempt.number,
                        attempt.elapsed.as_millis()
                    );
                    self.stats.record_delivered();
                    return;
                }
                NextAction::RetryAfter(delay) => {
                    warn!(
                        "Dispatcher | Attempt {}/{} failed, retrying in {} ms: {:?}",
                        attempt.number,
                        self.policy.max_attempts(),
                        delay.as_millis(),
                        attempt.outcome
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    number += 1;
                }
                NextAction::GiveUp => {
                    if attempt.outcome.is_transient() {
                        error!(
                            "Dispatcher | Giving up after {} attempts, dropping {} bytes: {:?}",
                            attempt.number,
                            payload.len(),
                            attempt.outcome
                        );
                        self.stats.record_exhausted();
                    } else {
                        error!(
                            "Dispatcher | Upstream rejected payload, dropping {} bytes: {:?}",
                            payload.len(),
                            attempt.outcome
                        );
                        self.stats.record_rejected_by_upstream();
                    }
                    return;
                }
            }
        }
    }

    /// Fetches a fresh token and sends once. The timeout covers both steps.
    async fn attempt(&self, payload: &LogPayload, number: u32) -> DeliveryAttempt {
        let timeout = self.policy.per_attempt_timeout();
        let time = Instant::now();
        let send = async {
            let token = match self.tokens.token().await {
                Ok(token) => token,
                Err(e) => {
                    return Outcome::TransientFailure(format!("failed to obtain token: {e}"))
                }
            };
            self.client.send(payload, &token, timeout).await
        };
        let outcome = match tokio::time::timeout(timeout, send).await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::TransientFailure(format!(
                "attempt timed out after {} ms",
                timeout.as_millis()
            )),
        };
        DeliveryAttempt {
            number,
            outcome,
            elapsed: time.elapsed(),
        }
    }
}

pub struct Dispatcher {
    tx: Sender<LogPayload>,
    config: DispatcherConfig,
    ctx: Arc<DeliveryContext>,
    tracker: TaskTracker,
    /// Stops intake; queued and in-flight payloads keep going.
    shutdown: CancellationToken,
    /// Cuts off whatever is still running once the drain deadline passes.
    abort: CancellationToken,
}

impl Dispatcher {
    /// Spawns the pump task, so it must be called from within a tokio runtime.
    pub fn new(
        config: DispatcherConfig,
        client: Arc<dyn UpstreamClient>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        let max_in_flight = config.max_in_flight.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let semaphore = Arc::new(Semaphore::new(max_in_flight));
        let tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();
        let abort = CancellationToken::new();

        let ctx = Arc::new(DeliveryContext {
            client,
            tokens,
            policy: config.retry_policy,
            stats: Arc::new(DeliveryStats::default()),
            active: AtomicUsize::new(0),
        });

        tracker.spawn(run_pump(
            rx,
            semaphore,
            tracker.clone(),
            Arc::clone(&ctx),
            shutdown.clone(),
            abort.clone(),
        ));

        Dispatcher {
            tx,
            config,
            ctx,
            tracker,
            shutdown,
            abort,
        }
    }

    /// Hands a payload over for delivery and returns at once.
    ///
    /// Never waits on the upstream. When the queue is full the new payload is rejected and the
    /// ones already queued are kept.
    pub fn dispatch(&self, payload: LogPayload) -> DispatchStatus {
        if self.shutdown.is_cancelled() {
            warn!("Dispatcher | Shutting down, dropping {} bytes", payload.len());
            self.ctx.stats.record_rejected_on_overflow();
            return DispatchStatus::Rejected;
        }
        match self.tx.try_send(payload) {
            Ok(()) => {
                self.ctx.stats.record_accepted();
                DispatchStatus::Queued
            }
            Err(TrySendError::Full(payload)) => {
                warn!(
                    "Dispatcher | Queue full ({} payloads), dropping {} bytes",
                    self.config.queue_capacity,
                    payload.len()
                );
                self.ctx.stats.record_rejected_on_overflow();
                DispatchStatus::Rejected
            }
            Err(TrySendError::Closed(payload)) => {
                warn!("Dispatcher | Queue closed, dropping {} bytes", payload.len());
                self.ctx.stats.record_rejected_on_overflow();
                DispatchStatus::Rejected
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Delivery loops currently running.
    pub fn in_flight(&self) -> usize {
        self.ctx.active.load(Ordering::Relaxed)
    }

    /// Payloads waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Stops intake and drains queued and in-flight payloads until `deadline`.
    ///
    /// Returns `true` when everything finished in time. Otherwise remaining loops are abandoned
    /// and their payloads lost.
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        debug!(
            "Dispatcher | Shutting down: {} in flight, {} queued",
            self.in_flight(),
            self.queued()
        );
        self.shutdown.cancel();
        self.tracker.close();

        if tokio::time::timeout(deadline, self.tracker.wait())
            .await
            .is_ok()
        {
            debug!("Dispatcher | Drained all payloads");
            return true;
        }

        self.abort.cancel();
        self.tracker.wait().await;
        warn!(
            "Dispatcher | Drain deadline of {} ms exceeded, abandoned {} payloads",
            deadline.as_millis(),
            self.ctx.stats.snapshot().abandoned
        );
        false
    }
}

async fn run_pump(
    mut rx: Receiver<LogPayload>,
    semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
    ctx: Arc<DeliveryContext>,
    shutdown: CancellationToken,
    abort: CancellationToken,
) {
    let mut closed = false;
    loop {
        // Take a slot before taking a payload, so waiting payloads stay in the bounded queue.
        let permit = tokio::select! {
            _ = abort.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let payload = tokio::select! {
            biased;
            _ = abort.cancelled() => break,
            _ = shutdown.cancelled(), if !closed => {
                rx.close();
                closed = true;
                continue;
            }
            payload = rx.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };

        let ctx = Arc::clone(&ctx);
        let abort = abort.clone();
        ctx.active.fetch_add(1, Ordering::Relaxed);
        tracker.spawn(async move {
            tokio::select! {
                _ = abort.cancelled() => ctx.stats.record_abandoned(1),
                _ = ctx.deliver(payload) => {}
            }
            ctx.active.fetch_sub(1, Ordering::Relaxed);
            drop(permit);
        });
    }

    rx.close();
    let mut dropped = 0;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        ctx.stats.record_abandoned(dropped);
    }
}
