//! S3 API metrics for Prometheus
//!
//! Tracks S3 operations, latencies, error rates and authorization decisions.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tessera_auth::{Decision, RequestType};

/// S3 operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum S3Operation {
    CreateBucket,
    ListObjects,
    PutObject,
    HeadObject,
    GetBucketAcl,
    PutBucketAcl,
    GetObjectAcl,
    PutObjectAcl,
    InitiateMultipartUpload,
    UploadPart,
    CompleteMultipartUpload,
    AbortMultipartUpload,
    ListParts,
    ListMultipartUploads,
}

impl S3Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateBucket => "CreateBucket",
            Self::ListObjects => "ListObjects",
            Self::PutObject => "PutObject",
            Self::HeadObject => "HeadObject",
            Self::GetBucketAcl => "GetBucketAcl",
            Self::PutBucketAcl => "PutBucketAcl",
            Self::GetObjectAcl => "GetObjectAcl",
            Self::PutObjectAcl => "PutObjectAcl",
            Self::InitiateMultipartUpload => "InitiateMultipartUpload",
            Self::UploadPart => "UploadPart",
            Self::CompleteMultipartUpload => "CompleteMultipartUpload",
            Self::AbortMultipartUpload => "AbortMultipartUpload",
            Self::ListParts => "ListParts",
            Self::ListMultipartUploads => "ListMultipartUploads",
        }
    }
}

const LATENCY_BUCKET_BOUNDARIES_MS: [u64; 11] =
    [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

/// Per-operation metrics
#[derive(Debug, Default)]
struct OperationMetrics {
    requests_total: AtomicU64,
    /// 2xx
    requests_success: AtomicU64,
    /// 4xx
    requests_client_error: AtomicU64,
    /// 5xx
    requests_server_error: AtomicU64,
    request_bytes_total: AtomicU64,
    response_bytes_total: AtomicU64,
    latency_sum_us: AtomicU64,
    /// Per-bucket counts; cumulated on export
    latency_buckets: [AtomicU64; 11],
}

impl OperationMetrics {
    fn record(&self, status_code: u16, request_bytes: u64, response_bytes: u64, latency_us: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        if (200..300).contains(&status_code) {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else if (400..500).contains(&status_code) {
            self.requests_client_error.fetch_add(1, Ordering::Relaxed);
        } else if status_code >= 500 {
            self.requests_server_error.fetch_add(1, Ordering::Relaxed);
        }

        self.request_bytes_total
            .fetch_add(request_bytes, Ordering::Relaxed);
        self.response_bytes_total
            .fetch_add(response_bytes, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let latency_ms = latency_us / 1000;
        if let Some(i) = LATENCY_BUCKET_BOUNDARIES_MS
            .iter()
            .position(|&boundary| latency_ms <= boundary)
        {
            self.latency_buckets[i].fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Gateway-level metrics
#[derive(Debug, Default)]
struct GatewayMetrics {
    requests_in_flight: AtomicU64,
}

/// Listing engine metrics
#[derive(Debug, Default)]
struct ListingMetrics {
    pages_total: AtomicU64,
    pages_truncated: AtomicU64,
    entries_returned: AtomicU64,
}

/// S3 metrics collector
#[derive(Debug)]
pub struct S3Metrics {
    operations: RwLock<HashMap<S3Operation, OperationMetrics>>,
    /// (request type, decision) -> count
    authorization_decisions: RwLock<HashMap<(RequestType, Decision), AtomicU64>>,
    listing: ListingMetrics,
    gateway: GatewayMetrics,
    start_time: Instant,
}

impl S3Metrics {
    /// Create a new S3 metrics collector
    #[must_use]
    pub fn new() -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
            authorization_decisions: RwLock::new(HashMap::new()),
            listing: ListingMetrics::default(),
            gateway: GatewayMetrics::default(),
            start_time: Instant::now(),
        }
    }

    /// Record an S3 operation
    pub fn record_operation(
        &self,
        op: S3Operation,
        status_code: u16,
        request_bytes: u64,
        response_bytes: u64,
        latency_us: u64,
    ) {
        let mut ops = self.operations.write();
        let metrics = ops.entry(op).or_default();
        metrics.record(status_code, request_bytes, response_bytes, latency_us);
    }

    /// Record a simple operation (no body sizes)
    pub fn record_simple(&self, op: S3Operation, status_code: u16, latency_us: u64) {
        self.record_operation(op, status_code, 0, 0, latency_us);
    }

    /// Record an authorization decision
    pub fn record_authorization(&self, request: RequestType, decision: Decision) {
        self.authorization_decisions
            .write()
            .entry((request, decision))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record one listing page
    pub fn record_listing_page(&self, entries: usize, truncated: bool) {
        self.listing.pages_total.fetch_add(1, Ordering::Relaxed);
        if truncated {
            self.listing.pages_truncated.fetch_add(1, Ordering::Relaxed);
        }
        self.listing
            .entries_returned
            .fetch_add(entries as u64, Ordering::Relaxed);
    }

    /// A request entered the gateway
    pub fn request_started(&self) {
        self.gateway
            .requests_in_flight
            .fetch_add(1, Ordering::Relaxed);
    }

    /// A request left the gateway
    pub fn request_finished(&self) {
        self.gateway
            .requests_in_flight
            .fetch_sub(1, Ordering::Relaxed);
    }

    /// Export metrics in Prometheus format
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(8 * 1024);

        let uptime_secs = self.start_time.elapsed().as_secs();
        let _ = writeln!(
            output,
            "# HELP tessera_gateway_uptime_seconds Gateway uptime in seconds"
        );
        let _ = writeln!(output, "# TYPE tessera_gateway_uptime_seconds counter");
        let _ = writeln!(output, "tessera_gateway_uptime_seconds {uptime_secs}");

        let _ = writeln!(
            output,
            "# HELP tessera_gateway_requests_in_flight S3 requests being served"
        );
        let _ = writeln!(output, "# TYPE tessera_gateway_requests_in_flight gauge");
        let _ = writeln!(
            output,
            "tessera_gateway_requests_in_flight {}",
            self.gateway.requests_in_flight.load(Ordering::Relaxed)
        );

        self.export_listing(&mut output);
        self.export_operations(&mut output);
        self.export_authorization(&mut output);

        output
    }

    fn export_listing(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# HELP tessera_listing_pages_total Listing pages served by truncation"
        );
        let _ = writeln!(output, "# TYPE tessera_listing_pages_total counter");
        let total = self.listing.pages_total.load(Ordering::Relaxed);
        let truncated = self.listing.pages_truncated.load(Ordering::Relaxed);
        let _ = writeln!(
            output,
            "tessera_listing_pages_total{{truncated=\"true\"}} {truncated}"
        );
        let _ = writeln!(
            output,
            "tessera_listing_pages_total{{truncated=\"false\"}} {}",
            total.saturating_sub(truncated)
        );

        let _ = writeln!(
            output,
            "# HELP tessera_listing_entries_total Contents and common prefixes returned"
        );
        let _ = writeln!(output, "# TYPE tessera_listing_entries_total counter");
        let _ = writeln!(
            output,
            "tessera_listing_entries_total {}",
            self.listing.entries_returned.load(Ordering::Relaxed)
        );
    }

    fn export_operations(&self, output: &mut String) {
        let ops = self.operations.read();

        let _ = writeln!(
            output,
            "# HELP tessera_s3_requests_total Total S3 requests by operation and status"
        );
        let _ = writeln!(output, "# TYPE tessera_s3_requests_total counter");
        for (op, metrics) in ops.iter() {
            let op_name = op.as_str();
            for (status, counter) in [
                ("success", &metrics.requests_success),
                ("client_error", &metrics.requests_client_error),
                ("server_error", &metrics.requests_server_error),
            ] {
                let _ = writeln!(
                    output,
                    "tessera_s3_requests_total{{operation=\"{op_name}\",status=\"{status}\"}} {}",
                    counter.load(Ordering::Relaxed)
                );
            }
        }

        let _ = writeln!(
            output,
            "# HELP tessera_s3_request_bytes_total Total request body bytes"
        );
        let _ = writeln!(output, "# TYPE tessera_s3_request_bytes_total counter");
        for (op, metrics) in ops.iter() {
            let _ = writeln!(
                output,
                "tessera_s3_request_bytes_total{{operation=\"{}\"}} {}",
                op.as_str(),
                metrics.request_bytes_total.load(Ordering::Relaxed)
            );
        }

        let _ = writeln!(
            output,
            "# HELP tessera_s3_response_bytes_total Total response body bytes"
        );
        let _ = writeln!(output, "# TYPE tessera_s3_response_bytes_total counter");
        for (op, metrics) in ops.iter() {
            let _ = writeln!(
                output,
                "tessera_s3_response_bytes_total{{operation=\"{}\"}} {}",
                op.as_str(),
                metrics.response_bytes_total.load(Ordering::Relaxed)
            );
        }

        let _ = writeln!(
            output,
            "# HELP tessera_s3_request_duration_seconds S3 request duration histogram"
        );
        let _ = writeln!(output, "# TYPE tessera_s3_request_duration_seconds histogram");
        for (op, metrics) in ops.iter() {
            let op_name = op.as_str();
            let total = metrics.requests_total.load(Ordering::Relaxed);
            let sum_us = metrics.latency_sum_us.load(Ordering::Relaxed);

            let mut cumulative = 0u64;
            for (i, &boundary_ms) in LATENCY_BUCKET_BOUNDARIES_MS.iter().enumerate() {
                cumulative += metrics.latency_buckets[i].load(Ordering::Relaxed);
                let _ = writeln!(
                    output,
                    "tessera_s3_request_duration_seconds_bucket{{operation=\"{op_name}\",le=\"{}\"}} {cumulative}",
                    boundary_ms as f64 / 1000.0,
                );
            }
            let _ = writeln!(
                output,
                "tessera_s3_request_duration_seconds_bucket{{operation=\"{op_name}\",le=\"+Inf\"}} {total}"
            );
            let _ = writeln!(
                output,
                "tessera_s3_request_duration_seconds_sum{{operation=\"{op_name}\"}} {}",
                sum_us as f64 / 1_000_000.0
            );
            let _ = writeln!(
                output,
                "tessera_s3_request_duration_seconds_count{{operation=\"{op_name}\"}} {total}"
            );
        }
    }

    fn export_authorization(&self, output: &mut String) {
        let decisions = self.authorization_decisions.read();
        if decisions.is_empty() {
            return;
        }
        let _ = writeln!(
            output,
            "# HELP tessera_authorization_decisions_total Authorization decisions by request type"
        );
        let _ = writeln!(output, "# TYPE tessera_authorization_decisions_total counter");
        for ((request, decision), count) in decisions.iter() {
            let decision = if decision.is_allowed() { "allow" } else { "deny" };
            let _ = writeln!(
                output,
                "tessera_authorization_decisions_total{{request=\"{request}\",decision=\"{decision}\"}} {}",
                count.load(Ordering::Relaxed)
            );
        }
    }
}

impl Default for S3Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Global S3 metrics instance
static S3_METRICS: OnceLock<S3Metrics> = OnceLock::new();

/// Get the global S3 metrics instance
pub fn s3_metrics() -> &'static S3Metrics {
    S3_METRICS.get_or_init(S3Metrics::new)
}

/// Times one operation until [`OperationTimer::complete`]
pub struct OperationTimer {
    op: S3Operation,
    start: Instant,
    request_bytes: u64,
}

impl OperationTimer {
    /// Start timing an operation
    #[must_use]
    pub fn new(op: S3Operation) -> Self {
        Self {
            op,
            start: Instant::now(),
            request_bytes: 0,
        }
    }

    /// Set the request body size
    #[must_use]
    pub const fn with_request_bytes(mut self, bytes: u64) -> Self {
        self.request_bytes = bytes;
        self
    }

    /// Complete the operation with a response
    pub fn complete(self, status_code: u16, response_bytes: u64) {
        let latency_us = u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX);
        s3_metrics().record_operation(
            self.op,
            status_code,
            self.request_bytes,
            response_bytes,
            latency_us,
        );
    }
}
