use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Directory under a class run holding one directory per public method.
pub const PER_FUNCTION_DIR: &str = "tests_per_public_function";

/// Directory inside a bundle directory holding prompt transcripts.
pub const PROMPTS_DIR: &str = "prompts";

/// Version directory name for artifacts produced by this build.
#[must_use]
pub fn current_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// ISO-8601 local time with `:` replaced by `-`, so it sorts and is a valid file name.
#[must_use]
pub fn run_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
        .replace(':', "-")
}

/// Paths of one class-level generation run.
///
/// `<output_dir>/<version>/<timestamp>/<Class>/...`
#[derive(Debug, Clone)]
pub struct RunLayout {
    pub run_dir: PathBuf,
    pub class_name: String,
}

impl RunLayout {
    #[must_use]
    pub fn new(output_dir: &Path, version: &str, timestamp: &str, class_name: &str) -> Self {
        Self {
            run_dir: output_dir.join(version).join(timestamp),
            class_name: class_name.to_string(),
        }
    }

    /// Layout for a run starting now under the current version.
    #[must_use]
    pub fn start(output_dir: &Path, class_name: &str) -> Self {
        Self::new(
            output_dir,
            current_version(),
            &run_timestamp(Local::now()),
            class_name,
        )
    }

    #[must_use]
    pub fn class_dir(&self) -> PathBuf {
        self.run_dir.join(&self.class_name)
    }

    #[must_use]
    pub fn bundle_dir(&self, target: &str, dependency: &str) -> PathBuf {
        self.class_dir()
            .join(PER_FUNCTION_DIR)
            .join(target)
            .join(dependency)
    }

    /// Final, deduplicated test class.
    #[must_use]
    pub fn test_class_path(&self, suffix: &str) -> PathBuf {
        self.class_dir()
            .join(format!("{}{suffix}.java", self.class_name))
    }

    /// Merged test class before duplicate removal.
    #[must_use]
    pub fn merged_class_path(&self, suffix: &str) -> PathBuf {
        self.class_dir()
            .join(format!("merged_{}{suffix}.java", self.class_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_has_no_colons() {
        let now = Local.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let ts = run_timestamp(now);
        assert!(ts.starts_with("2025-03-04T05-06-07."));
        assert!(!ts.contains(':'));
    }

    #[test]
    fn paths_follow_the_run_layout() {
        let layout = RunLayout::new(Path::new("out"), "0.2.0", "ts", "Account");
        assert_eq!(layout.class_dir(), Path::new("out/0.2.0/ts/Account"));
        assert_eq!(
            layout.bundle_dir("deposit", "validate"),
            Path::new("out/0.2.0/ts/Account/tests_per_public_function/deposit/validate")
        );
        assert_eq!(
            layout.test_class_path("MockitoTest"),
            Path::new("out/0.2.0/ts/Account/AccountMockitoTest.java")
        );
        assert_eq!(
            layout.merged_class_path("MockitoTest"),
            Path::new("out/0.2.0/ts/Account/merged_AccountMockitoTest.java")
        );
    }
}
