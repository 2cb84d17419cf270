// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Outcome classification and retry decisions for upstream attempts.
//!
//! Everything here is pure: no I/O, no clocks. The dispatcher feeds attempt results in and acts
//! on the [`NextAction`] it gets back.

use reqwest::StatusCode;
use std::time::Duration;

/// Result of a single upstream attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Worth another attempt: unreachable upstream, timeout, server-side error, missing token.
    TransientFailure(String),
    /// The upstream rejected the request itself; sending it again would fail the same way.
    NonRetriableFailure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Outcome::TransientFailure(_))
    }
}

/// Maps an upstream response status to an [`Outcome`].
///
/// 2xx succeeds. 5xx, 408 and 429 are transient. Every other status, including the remaining
/// 4xx codes, is non-retriable.
pub fn classify_status(status: StatusCode) -> Outcome {
    if status.is_success() {
        return Outcome::Success;
    }
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        return Outcome::TransientFailure(format!("upstream responded with {status}"));
    }
    Outcome::NonRetriableFailure(format!("upstream responded with {status}"))
}

/// Maps a transport error to an [`Outcome`].
///
/// Requests that could not even be built (bad URL, bad header) or that looped on redirects will
/// not get better on retry; connection, timeout and body errors will.
pub fn classify_transport_error(err: &reqwest::Error) -> Outcome {
    if let Some(status) = err.status() {
        return classify_status(status);
    }
    if err.is_builder() || err.is_redirect() {
        return Outcome::NonRetriableFailure(format!("invalid upstream request: {err}"));
    }
    if err.is_timeout() {
        return Outcome::TransientFailure(format!("upstream request timed out: {err}"));
    }
    Outcome::TransientFailure(format!("upstream unreachable: {err}"))
}

/// Delay between two attempts of the same payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Immediate,
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    Done,
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    per_attempt_timeout: Duration,
    backoff: Backoff,
}

impl RetryPolicy {
    /// `max_attempts` below 1 is raised to 1: every payload gets at least one attempt.
    pub fn new(max_attempts: u32, per_attempt_timeout: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            per_attempt_timeout,
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn per_attempt_timeout(&self) -> Duration {
        self.per_attempt_timeout
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Delay to wait after the given (1-based) attempt failed transiently.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Immediate => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let exponent = attempt.saturating_sub(1).min(31);
                base.checked_mul(1u32 << exponent)
                    .map_or(max, |delay| delay.min(max))
            }
        }
    }

    /// Decides what follows the given (1-based) attempt.
    pub fn next_action(&self, attempt: u32, outcome: &Outcome) -> NextAction {
        match outcome {
            Outcome::Success => NextAction::Done,
            Outcome::NonRetriableFailure(_) => NextAction::GiveUp,
            Outcome::TransientFailure(_) if attempt >= self.max_attempts => NextAction::GiveUp,
            Outcome::TransientFailure(_) => NextAction::RetryAfter(self.backoff_for(attempt)),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,
            Duration::from_secs(5),
            Backoff::Fixed(Duration::from_secs(1)),
        )
    }
}
