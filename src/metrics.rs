// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics collection for adlens.
//!
//! Tracks cache effectiveness and Graph API traffic.

use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

use crate::error::AppError;

/// Metrics collector for adlens
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,

    // Cache metrics
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub cache_stores: IntCounter,
    pub cache_clears: IntCounter,
    pub cache_expired: IntCounter,
    pub cache_errors: IntCounter,
    pub cache_keys: IntGauge,

    // Graph API metrics, labelled by operation
    pub upstream_requests: IntCounterVec,
    pub upstream_failures: IntCounterVec,
    pub upstream_latency: HistogramVec,
}

fn metric_error(e: prometheus::Error) -> AppError {
    AppError::Internal(anyhow::anyhow!("Failed to create metric: {}", e))
}

impl Metrics {
    pub fn new() -> Result<Self, AppError> {
        let registry = Registry::new();

        let cache_hits = IntCounter::with_opts(Opts::new(
            "adlens_cache_hits_total",
            "Total number of response cache hits",
        ))
        .map_err(metric_error)?;

        let cache_misses = IntCounter::with_opts(Opts::new(
            "adlens_cache_misses_total",
            "Total number of response cache misses",
        ))
        .map_err(metric_error)?;

        let cache_stores = IntCounter::with_opts(Opts::new(
            "adlens_cache_stores_total",
            "Total number of responses written to the cache",
        ))
        .map_err(metric_error)?;

        let cache_clears = IntCounter::with_opts(Opts::new(
            "adlens_cache_clears_total",
            "Total number of explicit cache clears",
        ))
        .map_err(metric_error)?;

        let cache_expired = IntCounter::with_opts(Opts::new(
            "adlens_cache_expired_total",
            "Total number of entries removed by the expiry sweep",
        ))
        .map_err(metric_error)?;

        let cache_errors = IntCounter::with_opts(Opts::new(
            "adlens_cache_errors_total",
            "Cache operations that failed and were skipped",
        ))
        .map_err(metric_error)?;

        let cache_keys = IntGauge::with_opts(Opts::new(
            "adlens_cache_keys",
            "Number of entries currently held in the cache",
        ))
        .map_err(metric_error)?;

        let upstream_requests = IntCounterVec::new(
            Opts::new(
                "adlens_upstream_requests_total",
                "Total number of Graph API requests issued",
            ),
            &["operation"],
        )
        .map_err(metric_error)?;

        let upstream_failures = IntCounterVec::new(
            Opts::new(
                "adlens_upstream_failures_total",
                "Graph API requests that ended in an error",
            ),
            &["operation"],
        )
        .map_err(metric_error)?;

        let upstream_latency = HistogramVec::new(
            HistogramOpts::new(
                "adlens_upstream_latency_seconds",
                "Duration of Graph API requests in seconds",
            )
            .buckets(vec![0.050, 0.100, 0.250, 0.500, 1.0, 2.0, 5.0, 10.0, 30.0]),
            &["operation"],
        )
        .map_err(metric_error)?;

        registry
            .register(Box::new(cache_hits.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(cache_misses.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(cache_stores.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(cache_clears.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(cache_expired.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(cache_errors.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(cache_keys.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(upstream_requests.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(upstream_failures.clone()))
            .map_err(metric_error)?;
        registry
            .register(Box::new(upstream_latency.clone()))
            .map_err(metric_error)?;

        Ok(Self {
            registry: Arc::new(registry),
            cache_hits,
            cache_misses,
            cache_stores,
            cache_clears,
            cache_expired,
            cache_errors,
            cache_keys,
            upstream_requests,
            upstream_failures,
            upstream_latency,
        })
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.inc();
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.inc();
    }

    pub fn record_cache_store(&self) {
        self.cache_stores.inc();
    }

    pub fn record_cache_clear(&self) {
        self.cache_clears.inc();
    }

    pub fn record_cache_error(&self) {
        self.cache_errors.inc();
    }

    /// Record entries dropped by the janitor
    pub fn record_cache_expired(&self, count: usize) {
        self.cache_expired.inc_by(count as u64);
    }

    pub fn update_cache_keys(&self, keys: usize) {
        self.cache_keys.set(i64::try_from(keys).unwrap_or(i64::MAX));
    }

    /// Record one Graph API call and its outcome
    pub fn record_upstream(&self, operation: &str, seconds: f64, failed: bool) {
        self.upstream_requests.with_label_values(&[operation]).inc();
        self.upstream_latency_for(operation).observe(seconds);
        if failed {
            self.upstream_failures.with_label_values(&[operation]).inc();
        }
    }

    fn upstream_latency_for(&self, operation: &str) -> Histogram {
        self.upstream_latency.with_label_values(&[operation])
    }

    /// Export metrics in Prometheus format
    pub fn export(&self) -> Result<String, AppError> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer).map_err(|e| {
            AppError::Internal(anyhow::anyhow!(
                "Failed to convert metrics to string: {}",
                e
            ))
        })
    }
}
