// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local delivery counters, shared by the dispatcher and every delivery loop.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    accepted: AtomicU64,
    rejected_on_overflow: AtomicU64,
    attempts: AtomicU64,
    delivered: AtomicU64,
    rejected_by_upstream: AtomicU64,
    exhausted: AtomicU64,
    abandoned: AtomicU64,
}

/// Point-in-time copy of [`DeliveryStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub rejected_on_overflow: u64,
    pub attempts: u64,
    pub delivered: u64,
    pub rejected_by_upstream: u64,
    pub exhausted: u64,
    pub abandoned: u64,
}

impl StatsSnapshot {
    /// Payloads whose delivery loop has finished, whatever the result.
    pub fn finished(&self) -> u64 {
        self.delivered + self.rejected_by_upstream + self.exhausted
    }
}

impl DeliveryStats {
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_on_overflow(&self) {
        self.rejected_on_overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_by_upstream(&self) {
        self.rejected_by_upstream.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected_on_overflow: self.rejected_on_overflow.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            rejected_by_upstream: self.rejected_by_upstream.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}
