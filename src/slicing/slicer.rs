use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{PunitoError, Result};
use crate::models::bundle::DependencyMap;
use crate::models::declaration::{CompilationUnit, TypeDecl};
use crate::slicing::callgraph::MethodRegistry;
use crate::slicing::extractor::{extract_method_source, span_text, LineSpan};

/// Closure traversal stops expanding below this depth.
pub const MAX_CLOSURE_DEPTH: usize = 64;

/// Everything needed to slice one class: the source text, its declaration and registry.
pub struct ClassSlicer<'a> {
    source: &'a str,
    unit: &'a CompilationUnit,
    decl: &'a TypeDecl,
    registry: MethodRegistry<'a>,
}

impl<'a> ClassSlicer<'a> {
    #[must_use]
    pub fn new(source: &'a str, unit: &'a CompilationUnit, decl: &'a TypeDecl) -> Self {
        Self {
            source,
            unit,
            decl,
            registry: MethodRegistry::from_type(decl),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &MethodRegistry<'a> {
        &self.registry
    }

    #[must_use]
    pub fn decl(&self) -> &'a TypeDecl {
        self.decl
    }

    fn method_source(&self, name: &str) -> Result<String> {
        let method = self
            .registry
            .get(name)
            .ok_or_else(|| PunitoError::MethodNotFound { name: name.into() })?;
        extract_method_source(self.source, method).ok_or_else(|| PunitoError::Parse {
            path: self.decl.name.clone(),
            detail: format!("method {name} starts outside the source text"),
        })
    }

    /// Imports, class signature and field declarations, up to the open class body.
    fn header(&self) -> String {
        let mut header = String::new();
        if !self.unit.imports.is_empty() {
            header.push_str(&self.unit.imports_text());
            header.push_str("\n\n");
        }
        header.push_str(&self.decl.signature);
        header.push_str(" {\n");

        let fields: Vec<String> = self
            .decl
            .fields
            .iter()
            .map(|f| {
                let span = LineSpan {
                    start: f.start_line,
                    end: f.end_line,
                };
                span_text(self.source, span)
            })
            .collect();
        if !fields.is_empty() {
            header.push_str(&fields.join("\n"));
            header.push('\n');
        }
        header
    }

    /// Header + target + each method in `others`, closed with the class brace.
    fn assemble(&self, target: &str, others: &[&str]) -> Result<String> {
        let mut parts = vec![self.method_source(target)?];
        for name in others {
            parts.push(self.method_source(name)?);
        }
        Ok(format!("{}\n{}\n}}", self.header(), parts.join("\n\n")))
    }

    /// Transitive intra-class callees of `root`, `root` included.
    ///
    /// Iterative depth-first traversal; the visited set doubles as the
    /// closure so cycles terminate. Methods in `boundary` are neither
    /// included nor expanded, and `skip` is never included.
    #[must_use]
    pub fn closure(&self, root: &'a str, boundary: &HashSet<&str>, skip: Option<&str>) -> Vec<&'a str> {
        let mut visited: HashSet<&str> = HashSet::new();
        if let Some(skip) = skip {
            visited.insert(skip);
        }
        let mut closure = Vec::new();
        let mut stack = vec![(root, 0usize)];

        while let Some((name, depth)) = stack.pop() {
            if !visited.insert(name) {
                continue;
            }
            closure.push(name);
            if depth >= MAX_CLOSURE_DEPTH {
                warn!(method = name, depth, "closure depth limit reached, not expanding further");
                continue;
            }
            for callee in self.registry.calls_of(name).into_iter().rev() {
                if !boundary.contains(callee) && !visited.contains(callee) {
                    stack.push((callee, depth + 1));
                }
            }
        }
        closure
    }

    /// Target plus the bodies of its direct callees outside `boundary`.
    pub fn basic_context(&self, target: &str, boundary: &HashSet<&str>) -> Result<String> {
        let direct: Vec<&str> = self
            .registry
            .calls_of(target)
            .into_iter()
            .filter(|d| *d != target && !boundary.contains(d))
            .collect();
        self.assemble(target, &direct)
    }

    /// One bundle per direct dependency of `target` that is outside
    /// `boundary` and not yet in `extracted`.
    ///
    /// Each bundle holds the target and the dependency's closure. Bare calls
    /// with no declaration on the class get a target-only bundle. Every
    /// dependency sliced here is added to `extracted`.
    pub fn slice_dependencies(
        &self,
        target: &str,
        boundary: &HashSet<&str>,
        extracted: &mut HashSet<String>,
    ) -> Result<DependencyMap> {
        if !self.registry.contains(target) {
            return Err(PunitoError::MethodNotFound {
                name: target.into(),
            });
        }

        let mut deps = DependencyMap::new();
        for dep in self.registry.calls_of(target) {
            if dep == target || boundary.contains(dep) || extracted.contains(dep) {
                continue;
            }
            let closure = self.closure(dep, boundary, Some(target));
            debug!(method = target, dependency = dep, closure = closure.len(), "sliced dependency");
            deps.insert(dep.to_string(), self.assemble(target, &closure)?);
            extracted.insert(dep.to_string());
        }

        for dep in self.registry.unresolved_calls_of(target) {
            if boundary.contains(dep.as_str()) || extracted.contains(&dep) {
                continue;
            }
            debug!(method = target, dependency = %dep, "unresolved call, bundle holds the target only");
            deps.insert(dep.clone(), self.assemble(target, &[])?);
            extracted.insert(dep);
        }

        Ok(deps)
    }

    /// Imports followed by the target and every method it reaches, with no boundary.
    pub fn full_context(&self, target: &str) -> Result<String> {
        let root = self
            .registry
            .get(target)
            .ok_or_else(|| PunitoError::MethodNotFound {
                name: target.into(),
            })?;
        let closure = self.closure(root.name.as_str(), &HashSet::new(), None);
        let mut parts = Vec::with_capacity(closure.len());
        for name in closure {
            parts.push(self.method_source(name)?);
        }
        Ok(format!(
            "{}\n\n{}",
            self.unit.imports_text(),
            parts.join("\n\n")
        ))
    }
}
