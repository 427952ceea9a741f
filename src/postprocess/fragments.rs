use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::debug;

use crate::error::{PunitoError, Result};
use crate::pipeline::layout::{PER_FUNCTION_DIR, PROMPTS_DIR};

/// Stage output prefixes, most advanced first.
const STAGE_PREFERENCE: &[&str] = &["refined_", "initial_"];

/// A generated test fragment read back from a run directory.
#[derive(Debug, Clone)]
pub struct StoredFragment {
    pub target: String,
    pub dependency: String,
    pub path: PathBuf,
    pub text: String,
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Newest run directory (`<output_dir>/<version>/<timestamp>`).
pub fn latest_run_dir(output_dir: &Path, version: &str) -> Result<PathBuf> {
    let version_dir = output_dir.join(version);
    if !version_dir.is_dir() {
        return Err(PunitoError::Other(format!(
            "no generated tests under {}",
            version_dir.display()
        )));
    }
    subdirs(&version_dir)?.pop().ok_or_else(|| {
        PunitoError::Other(format!("no runs under {}", version_dir.display()))
    })
}

/// Class directory of a run: the named one, or the first when unnamed.
pub fn class_dir_in_run(run_dir: &Path, class_name: Option<&str>) -> Result<PathBuf> {
    if let Some(name) = class_name {
        let dir = run_dir.join(name);
        return if dir.is_dir() {
            Ok(dir)
        } else {
            Err(PunitoError::Other(format!(
                "class {name} not found in {}",
                run_dir.display()
            )))
        };
    }
    subdirs(run_dir)?
        .into_iter()
        .find(|d| d.join(PER_FUNCTION_DIR).is_dir())
        .ok_or_else(|| PunitoError::Other(format!("no class runs in {}", run_dir.display())))
}

fn stage_rank(file_name: &str) -> Option<usize> {
    if !file_name.ends_with(".java") {
        return None;
    }
    STAGE_PREFERENCE
        .iter()
        .position(|prefix| file_name.starts_with(prefix))
}

/// Collect one fragment per bundle directory of a class run, ordered by
/// (public method, dependency). Refined output wins over initial output.
pub fn collect_fragments(class_dir: &Path) -> Result<Vec<StoredFragment>> {
    let root = class_dir.join(PER_FUNCTION_DIR);
    if !root.is_dir() {
        return Err(PunitoError::Other(format!(
            "{} has no {PER_FUNCTION_DIR} directory",
            class_dir.display()
        )));
    }

    // (target, dependency) -> (rank, path)
    let mut best: BTreeMap<(String, String), (usize, PathBuf)> = BTreeMap::new();
    let walker = WalkBuilder::new(&root)
        .hidden(true)
        .git_ignore(false)
        .follow_links(false)
        .max_depth(Some(3))
        .filter_entry(|e| e.file_name() != PROMPTS_DIR)
        .build();

    for entry in walker.filter_map(std::result::Result::ok) {
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.into_path();
        let Some(rank) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(stage_rank)
        else {
            continue;
        };
        let Ok(relative) = path.strip_prefix(&root) else {
            continue;
        };
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let [target, dependency, _file] = parts.as_slice() else {
            continue;
        };

        let key = (target.clone(), dependency.clone());
        let better = best.get(&key).map_or(true, |(current, _)| rank < *current);
        if better {
            best.insert(key, (rank, path));
        }
    }

    let mut fragments = Vec::with_capacity(best.len());
    for ((target, dependency), (_, path)) in best {
        let text = std::fs::read_to_string(&path)?;
        debug!(path = %path.display(), "collected fragment");
        fragments.push(StoredFragment {
            target,
            dependency,
            path,
            text,
        });
    }
    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, text: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn latest_run_is_the_greatest_timestamp() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("0.2.0/2025-01-01T10-00-00.000000")).unwrap();
        std::fs::create_dir_all(tmp.path().join("0.2.0/2025-02-01T09-00-00.000000")).unwrap();
        let latest = latest_run_dir(tmp.path(), "0.2.0").unwrap();
        assert!(latest.ends_with("2025-02-01T09-00-00.000000"));
        assert!(latest_run_dir(tmp.path(), "9.9.9").is_err());
    }

    #[test]
    fn refined_output_wins_and_transcripts_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let class_dir = tmp.path().join("Account");
        let root = class_dir.join(PER_FUNCTION_DIR);
        write(&root.join("deposit/validate/initial_validate.java"), "initial");
        write(&root.join("deposit/validate/refined_validate.java"), "refined");
        write(&root.join("deposit/validate/plan_validate.txt"), "plan");
        write(
            &root.join("deposit/validate/prompts/refiner_prompt_refined_validate.java"),
            "transcript",
        );
        write(&root.join("deposit/deposit/initial_deposit.java"), "basic");
        write(&root.join("close/close/initial_close.java"), "close");

        let fragments = collect_fragments(&class_dir).unwrap();
        let keys: Vec<_> = fragments
            .iter()
            .map(|f| (f.target.as_str(), f.dependency.as_str(), f.text.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("close", "close", "close"),
                ("deposit", "deposit", "basic"),
                ("deposit", "validate", "refined"),
            ]
        );
    }

    #[test]
    fn class_dir_defaults_to_the_first_class() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("Account").join(PER_FUNCTION_DIR)).unwrap();
        let dir = class_dir_in_run(tmp.path(), None).unwrap();
        assert!(dir.ends_with("Account"));
        assert!(class_dir_in_run(tmp.path(), Some("Missing")).is_err());
    }
}
