use std::collections::BTreeMap;

use serde::Serialize;

/// Dependency name -> self-contained source bundle.
pub type DependencyMap = BTreeMap<String, String>;

/// One unit of generation work: the slice for a (public method, dependency) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bundle {
    /// Public method the tests are executed through.
    pub target: String,
    /// Dependency key; equals `target` for the basic-context bundle.
    pub dependency: String,
    pub source: String,
}

impl Bundle {
    /// True for the bundle keyed by the target's own name.
    #[must_use]
    pub fn is_basic_context(&self) -> bool {
        self.target == self.dependency
    }
}

/// Planner output: public method -> {dependency -> bundle text}.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChunkPlan {
    pub targets: BTreeMap<String, DependencyMap>,
}

impl ChunkPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    #[must_use]
    pub fn bundle_count(&self) -> usize {
        self.targets.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn get(&self, target: &str, dependency: &str) -> Option<&str> {
        self.targets
            .get(target)
            .and_then(|deps| deps.get(dependency))
            .map(String::as_str)
    }

    /// Flatten into work items, ordered by (target, dependency).
    #[must_use]
    pub fn bundles(&self) -> Vec<Bundle> {
        self.targets
            .iter()
            .flat_map(|(target, deps)| {
                deps.iter().map(move |(dependency, source)| Bundle {
                    target: target.clone(),
                    dependency: dependency.clone(),
                    source: source.clone(),
                })
            })
            .collect()
    }
}
