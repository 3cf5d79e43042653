//! Hot-path counters for the rewrite pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Relaxed counters; the pipeline bumps these on every intercepted packet,
/// so they must never contend.
#[derive(Debug, Default)]
pub struct RewriteMetrics {
    pub packets_inspected: AtomicUsize,
    pub packets_rewritten: AtomicUsize,
    pub oversized_skipped: AtomicUsize,
    pub repairs_scheduled: AtomicUsize,
}

impl RewriteMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_inspected(&self) {
        self.packets_inspected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rewritten(&self) {
        self.packets_rewritten.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_oversized(&self) {
        self.oversized_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_repair(&self) {
        self.repairs_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn generate_report(&self) -> String {
        let inspected = self.packets_inspected.load(Ordering::Relaxed);
        let rewritten = self.packets_rewritten.load(Ordering::Relaxed);
        let rate = if inspected > 0 {
            rewritten as f64 / inspected as f64 * 100.0
        } else {
            0.0
        };
        format!(
            "Rewrite Pipeline Report\n\
             =======================\n\
             Packets Inspected: {}\n\
             Packets Rewritten: {} ({:.1}%)\n\
             Oversized Skipped: {}\n\
             Repairs Scheduled: {}\n",
            inspected,
            rewritten,
            rate,
            self.oversized_skipped.load(Ordering::Relaxed),
            self.repairs_scheduled.load(Ordering::Relaxed),
        )
    }
}
