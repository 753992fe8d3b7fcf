use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, Encoder, Histogram,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Business Metrics
    pub static ref QUIZ_SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_submissions_total",
        "Quiz submissions by outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref QUIZ_SUBMISSION_PERCENTAGE: Histogram = register_histogram!(
        "quiz_submission_percentage",
        "Percentage scored by stored attempts",
        vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0]
    )
    .unwrap();

    pub static ref QUIZ_LIKE_TOGGLES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_like_toggles_total",
        "Like toggles by resulting state",
        &["action"]
    )
    .unwrap();

    pub static ref COMMUNITY_MEMBERSHIP_TOGGLES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "community_membership_toggles_total",
        "Join/leave toggles by resulting state",
        &["action"]
    )
    .unwrap();

    pub static ref AUTH_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "auth_events_total",
        "Authentication events",
        &["event", "status"]
    )
    .unwrap();

    pub static ref RATE_LIMIT_REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rate_limit_rejections_total",
        "Requests rejected by rate limiting",
        &["scope"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

pub fn record_submission(outcome: &str) {
    QUIZ_SUBMISSIONS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_auth_event(event: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    AUTH_EVENTS_TOTAL.with_label_values(&[event, status]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        record_submission("stored");

        let output = render_metrics().unwrap();
        assert!(output.contains("http_requests_total"));
        assert!(output.contains("quiz_submissions_total"));
    }
}
