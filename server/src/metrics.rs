// Request and relay counters exposed at /metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-endpoint metrics
#[derive(Debug, Clone)]
pub struct EndpointMetrics {
    pub request_count: Arc<AtomicU64>,
    pub error_count: Arc<AtomicU64>,
    pub total_latency_ms: Arc<AtomicU64>,
    pub max_latency_ms: Arc<AtomicU64>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            total_latency_ms: Arc::new(AtomicU64::new(0)),
            max_latency_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn record_request(&self, latency_ms: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.request_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    pub fn stats(&self) -> EndpointStats {
        EndpointStats {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms(),
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Relay-specific metrics
#[derive(Debug, Clone, Default)]
pub struct RelayMetrics {
    pub streams_started: Arc<AtomicU64>,
    pub streams_completed: Arc<AtomicU64>,
    pub streams_aborted: Arc<AtomicU64>,
    pub frames_relayed: Arc<AtomicU64>,
}

impl RelayMetrics {
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            streams_started: self.streams_started.load(Ordering::Relaxed),
            streams_completed: self.streams_completed.load(Ordering::Relaxed),
            streams_aborted: self.streams_aborted.load(Ordering::Relaxed),
            frames_relayed: self.frames_relayed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppMetrics {
    pub chat: EndpointMetrics,
    pub tts: EndpointMetrics,
    pub relay: RelayMetrics,
    started: Instant,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self {
            chat: EndpointMetrics::new(),
            tts: EndpointMetrics::new(),
            relay: RelayMetrics::default(),
            started: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> MetricsResponse {
        MetricsResponse {
            timestamp: Utc::now(),
            uptime_seconds: self.started.elapsed().as_secs(),
            chat: self.chat.stats(),
            tts: self.tts.stats(),
            relay: self.relay.stats(),
        }
    }
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub chat: EndpointStats,
    pub tts: EndpointStats,
    pub relay: RelayStats,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct RelayStats {
    pub streams_started: u64,
    pub streams_completed: u64,
    pub streams_aborted: u64,
    pub frames_relayed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_latency_stats() {
        let metrics = EndpointMetrics::new();
        assert_eq!(metrics.avg_latency_ms(), 0.0);
        metrics.record_request(10);
        metrics.record_request(30);
        metrics.record_error();

        let stats = metrics.stats();
        assert_eq!(stats.request_count, 2);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.avg_latency_ms, 20.0);
        assert_eq!(stats.max_latency_ms, 30);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = AppMetrics::new();
        let clone = metrics.clone();
        clone.relay.frames_relayed.fetch_add(3, Ordering::Relaxed);
        assert_eq!(metrics.snapshot().relay.frames_relayed, 3);
    }
}
