use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{PunitoError, Result};
use crate::ingest::source::{parse_class_source, read_class_file, SourceClass};
use crate::models::bundle::ChunkPlan;
use crate::models::declaration::{MethodDecl, TypeDecl};
use crate::slicing::slicer::ClassSlicer;

/// Syntactic shapes of trivial accessors, matched against a whitespace-normalized body.
pub struct AccessorFilter {
    getter: Regex,
    setter: Regex,
}

impl AccessorFilter {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| PunitoError::Other(format!("invalid regex: {e}")))
        };
        Ok(Self {
            getter: compile(r"^return\s+(?:this\.)?(\w+)\s*;$")?,
            setter: compile(r"^(?:this\.)?(\w+)\s*=\s*(\w+)\s*;$")?,
        })
    }

    /// `return field;` or `field = param;` where `field` is declared on `owner`.
    #[must_use]
    pub fn is_trivial_accessor(&self, method: &MethodDecl, owner: &TypeDecl) -> bool {
        let Some(body) = method.body.as_deref() else {
            return false;
        };
        let inner = normalized_inner_body(body);
        let is_field = |name: &str| owner.field_names().any(|f| f == name);

        if let Some(caps) = self.getter.captures(&inner) {
            return is_field(&caps[1]);
        }
        if let Some(caps) = self.setter.captures(&inner) {
            let [param] = method.parameters.as_slice() else {
                return false;
            };
            return caps[2] == param.name && is_field(&caps[1]);
        }
        false
    }
}

/// Body text without the outer braces, whitespace collapsed to single spaces.
fn normalized_inner_body(body: &str) -> String {
    let trimmed = body.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(trimmed);
    inner.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Plan every public, non-accessor method of the class.
///
/// Each target gets its basic-context bundle under its own name plus one
/// bundle per dependency not already sliced for an earlier target.
pub fn plan_class(class: &SourceClass) -> Result<ChunkPlan> {
    let decl = primary_decl(class)?;
    let slicer = ClassSlicer::new(&class.source, &class.unit, decl);
    let filter = AccessorFilter::new()?;

    let targets: Vec<&MethodDecl> = slicer
        .registry()
        .public_methods()
        .filter(|m| {
            let trivial = filter.is_trivial_accessor(m, decl);
            if trivial {
                debug!(method = %m.name, "skipping trivial accessor");
            }
            !trivial
        })
        .collect();

    // Public methods are tested on their own, so they bound every slice.
    let boundary: HashSet<&str> = slicer
        .registry()
        .public_methods()
        .map(|m| m.name.as_str())
        .collect();
    let mut extracted = HashSet::new();

    let mut plan = ChunkPlan::default();
    for method in targets {
        let name = method.name.as_str();
        let mut deps = slicer.slice_dependencies(name, &boundary, &mut extracted)?;
        deps.insert(name.to_string(), slicer.basic_context(name, &boundary)?);
        plan.targets.insert(name.to_string(), deps);
    }

    info!(
        class = %class.class_name,
        targets = plan.targets.len(),
        bundles = plan.bundle_count(),
        "planned class"
    );
    Ok(plan)
}

fn primary_decl(class: &SourceClass) -> Result<&TypeDecl> {
    class.primary_type().ok_or_else(|| PunitoError::Parse {
        path: class.path.display().to_string(),
        detail: "no type declaration found".into(),
    })
}

/// A method of the class together with every method it transitively calls.
pub fn method_context(class: &SourceClass, method: &str) -> Result<String> {
    let decl = primary_decl(class)?;
    ClassSlicer::new(&class.source, &class.unit, decl).full_context(method)
}

/// Parse and plan in-memory source named after `path`.
pub fn plan_source(path: &Path, source: &str) -> Result<ChunkPlan> {
    let class = parse_class_source(path, source.to_string())?;
    plan_class(&class)
}

/// Plan several class files in parallel; each class has its own accumulator.
#[must_use]
pub fn plan_files(paths: &[PathBuf]) -> Vec<(PathBuf, Result<ChunkPlan>)> {
    paths
        .par_iter()
        .map(|path| {
            let plan = read_class_file(path).and_then(|class| plan_class(&class));
            (path.clone(), plan)
        })
        .collect()
}

/// Indented text listing of a plan: one block per target, code quoted.
#[must_use]
pub fn format_plan(plan: &ChunkPlan) -> String {
    let mut out = String::from("{\n");
    for (target, deps) in &plan.targets {
        out.push_str(&format!("    {target}: {{\n"));
        for (dep, source) in deps {
            out.push_str(&format!("        {dep}: \n"));
            out.push_str("        '\n");
            for line in source.trim().lines() {
                out.push_str("            ");
                out.push_str(line);
                out.push('\n');
            }
            out.push_str("        '\n");
        }
        out.push_str("    }\n");
    }
    out.push('}');
    out
}
