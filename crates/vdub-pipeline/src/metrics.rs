//! Stage metrics.

use metrics::{counter, histogram};
use vdub_models::Stage;

/// Metric names as constants for consistency.
pub mod names {
    pub const STAGES_STARTED_TOTAL: &str = "vdub_stages_started_total";
    pub const STAGES_COMPLETED_TOTAL: &str = "vdub_stages_completed_total";
    pub const STAGES_FAILED_TOTAL: &str = "vdub_stages_failed_total";
    pub const STAGE_DURATION_SECONDS: &str = "vdub_stage_duration_seconds";
    pub const UPLOADS_TOTAL: &str = "vdub_uploads_total";
    pub const ARTIFACTS_REMOVED_TOTAL: &str = "vdub_artifacts_removed_total";
    pub const CLEANUP_WARNINGS_TOTAL: &str = "vdub_cleanup_warnings_total";
}

pub fn record_stage_started(stage: Stage) {
    counter!(names::STAGES_STARTED_TOTAL, "stage" => stage.as_str()).increment(1);
}

pub fn record_stage_finished(stage: Stage, success: bool, duration_secs: f64) {
    let name = if success {
        names::STAGES_COMPLETED_TOTAL
    } else {
        names::STAGES_FAILED_TOTAL
    };
    counter!(name, "stage" => stage.as_str()).increment(1);
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage.as_str()).record(duration_secs);
}

pub fn record_upload(bytes: u64) {
    counter!(names::UPLOADS_TOTAL).increment(1);
    histogram!("vdub_upload_bytes").record(bytes as f64);
}

pub fn record_artifacts_removed(count: usize) {
    if count > 0 {
        counter!(names::ARTIFACTS_REMOVED_TOTAL).increment(count as u64);
    }
}

pub fn record_cleanup_warning() {
    counter!(names::CLEANUP_WARNINGS_TOTAL).increment(1);
}
