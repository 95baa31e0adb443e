//! Metrics related utilities
use futures::Future;

use crate::builder::stage::Method;
use crate::builder::Request;
use crate::RpcError;

const METRIC_REQUESTS: &str = "tmtop_rpc_requests_total";
const METRIC_FAILED_REQUESTS: &str = "tmtop_rpc_requests_failed_total";
const METRIC_REQUESTS_LATENCY: &str = "tmtop_rpc_request_duration_seconds";
const REASON_DECODE: &str = "decode";
const REASON_JSON_RPC: &str = "json_rpc";
const REASON_RATE_LIMITING: &str = "rate_limiting";
const REASON_TIMEOUT: &str = "timeout";
const REASONS: [&str; 4] = [
    REASON_DECODE,
    REASON_JSON_RPC,
    REASON_RATE_LIMITING,
    REASON_TIMEOUT,
];

/// Register all request related metrics
pub fn register() {
    Request::<'_, Method>::METHODS.iter().for_each(|&method| {
        let _ = metrics::register_counter!(METRIC_REQUESTS, "method" => method);
        let _ = metrics::register_counter!(METRIC_FAILED_REQUESTS, "method" => method);
        let _ = metrics::register_histogram!(METRIC_REQUESTS_LATENCY, "method" => method);

        REASONS.iter().for_each(|&reason| {
            let _ = metrics::register_counter!(METRIC_FAILED_REQUESTS, "method" => method, "reason" => reason);
        });
    });
}

/// Carries metrics metadata while creating requests
#[derive(Clone, Copy, Debug)]
pub struct RequestMetadata {
    pub method: &'static str,
}

impl RequestMetadata {
    pub fn new(method: &'static str) -> Self {
        Self { method }
    }
}

/// Awaits `f` and records, for its method:
/// - `tmtop_rpc_requests_total`,
/// - `tmtop_rpc_request_duration_seconds`,
/// - `tmtop_rpc_requests_failed_total` if `f` fails, once without and once
///   with a `reason` label when the failure has a known reason.
pub async fn with_metrics<T>(
    meta: RequestMetadata,
    f: impl Future<Output = Result<T, RpcError>>,
) -> Result<T, RpcError> {
    let method = meta.method;
    metrics::increment_counter!(METRIC_REQUESTS, "method" => method);

    let started = std::time::Instant::now();
    let result = f.await;
    metrics::histogram!(METRIC_REQUESTS_LATENCY, started.elapsed().as_secs_f64(), "method" => method);

    if let Err(e) = &result {
        metrics::increment_counter!(METRIC_FAILED_REQUESTS, "method" => method);

        if let Some(reason) = failure_reason(e) {
            metrics::increment_counter!(METRIC_FAILED_REQUESTS, "method" => method, "reason" => reason);
        }
    }

    result
}

fn failure_reason(e: &RpcError) -> Option<&'static str> {
    match e {
        RpcError::JsonRpc { .. } => Some(REASON_JSON_RPC),
        RpcError::InvalidResponse(_) => Some(REASON_DECODE),
        RpcError::Reqwest(e) if e.is_decode() => Some(REASON_DECODE),
        RpcError::Reqwest(e) if e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) => {
            Some(REASON_RATE_LIMITING)
        }
        RpcError::Reqwest(e) if e.is_timeout() => Some(REASON_TIMEOUT),
        RpcError::Reqwest(_) => None,
    }
}
