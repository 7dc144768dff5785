// Prometheus metrics for the execution endpoint

use lazy_static::lazy_static;
use polyrun_common::types::ExecutionResult;
use polyrun_engine::ExecutionError;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    static ref JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "polyrun_jobs_total",
        "Jobs that reached a terminal outcome",
        &["language", "outcome"]
    )
    .expect("polyrun_jobs_total can be registered");
    static ref JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "polyrun_job_duration_seconds",
        "Wall-clock time from job start to terminal outcome",
        &["language"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]
    )
    .expect("polyrun_job_duration_seconds can be registered");
    static ref FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "polyrun_failures_total",
        "Requests that ended without an execution result",
        &["kind"]
    )
    .expect("polyrun_failures_total can be registered");
}

pub fn observe_result(result: &ExecutionResult) {
    JOBS_TOTAL
        .with_label_values(&[result.language.as_str(), result.outcome.as_str()])
        .inc();
    JOB_DURATION_SECONDS
        .with_label_values(&[result.language.as_str()])
        .observe(result.duration_ms as f64 / 1000.0);
}

pub fn observe_error(err: &ExecutionError) {
    FAILURES_TOTAL.with_label_values(&[err.kind()]).inc();
}

/// Text exposition of the default registry.
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
