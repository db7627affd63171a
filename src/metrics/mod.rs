//! Metrics module
//!
//! Prometheus metrics for the writer and reader services.

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Histogram, HistogramVec,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "image_uploads_total",
        "Total number of uploads",
        &["status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "image_upload_bytes_total",
        "Total bytes committed by uploads"
    ).unwrap();

    pub static ref UPLOAD_CHUNKS: Histogram = register_histogram!(
        "image_upload_chunks",
        "Number of chunks per committed upload",
        vec![1.0, 2.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
    ).unwrap();

    pub static ref OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "image_operation_duration_seconds",
        "Store-backed operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    // Delete / read metrics
    pub static ref DELETES_TOTAL: CounterVec = register_counter_vec!(
        "image_deletes_total",
        "Total number of deletes",
        &["status"]
    ).unwrap();

    pub static ref READS_TOTAL: CounterVec = register_counter_vec!(
        "image_reads_total",
        "Total number of reads",
        &["status"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "image_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

fn status_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record a committed upload
pub fn record_upload_success(bytes: u64, chunks: usize) {
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
    UPLOAD_CHUNKS.observe(chunks as f64);
}

/// Record a failed upload
pub fn record_upload_failure() {
    UPLOADS_TOTAL.with_label_values(&["failure"]).inc();
}

/// Record how long an operation took
pub fn record_operation_duration(operation: &str, duration_secs: f64) {
    OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Record a delete
pub fn record_delete(success: bool) {
    DELETES_TOTAL.with_label_values(&[status_label(success)]).inc();
}

/// Record a read
pub fn record_read(success: bool) {
    READS_TOTAL.with_label_values(&[status_label(success)]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}
