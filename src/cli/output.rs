use serde::Serialize;

use crate::postprocess::DuplicateGroup;

/// Format a result as minified JSON.
pub fn format_json<T: Serialize>(result: &T) -> String {
    serde_json::to_string(result).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

/// Format an error as JSON.
pub fn format_error(err: &dyn std::fmt::Display) -> String {
    serde_json::json!({ "error": err.to_string() }).to_string()
}

/// Outcome of re-merging a previous run.
#[derive(Debug, Serialize)]
pub struct MergeOutput {
    pub class_dir: String,
    pub fragments: usize,
    pub test_class: String,
}

/// Outcome of duplicate removal on a test file.
#[derive(Debug, Serialize)]
pub struct DedupeOutput {
    pub file: String,
    pub removed: Vec<DuplicateGroup>,
}

/// One class of a multi-file chunk run.
#[derive(Debug, Serialize)]
pub struct ChunkEntry<T: Serialize> {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
