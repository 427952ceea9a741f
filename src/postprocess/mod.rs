pub mod dedup;
pub mod fragments;
pub mod merger;

pub use dedup::{find_duplicates, remove_duplicates, DuplicateGroup};
pub use fragments::{class_dir_in_run, collect_fragments, latest_run_dir, StoredFragment};
pub use merger::{merge_fragments, strip_code_fences};

use crate::error::Result;

/// Merged test class before and after duplicate removal.
#[derive(Debug, Clone)]
pub struct FinalizedClass {
    pub merged: String,
    pub deduplicated: String,
}

/// Merge fragments into one class, then drop structurally duplicate tests.
pub fn finalize(class_name: &str, fragments: &[String]) -> Result<FinalizedClass> {
    let merged = merge_fragments(Some(class_name), fragments)?;
    let deduplicated = remove_duplicates(&merged)?;
    Ok(FinalizedClass {
        merged,
        deduplicated,
    })
}
