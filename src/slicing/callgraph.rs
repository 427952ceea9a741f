use std::collections::{HashMap, HashSet};

use crate::models::declaration::{MethodDecl, TypeDecl};

/// Method name -> declaration for one class, built once and read-only afterwards.
///
/// Only methods with a body are registered. Overloads share a name and the
/// last declaration wins, so call edges to overloaded methods may point at
/// the wrong body.
#[derive(Debug, Default)]
pub struct MethodRegistry<'a> {
    methods: HashMap<&'a str, &'a MethodDecl>,
    /// Registered names in declaration order (first occurrence).
    order: Vec<&'a str>,
}

impl<'a> MethodRegistry<'a> {
    #[must_use]
    pub fn from_type(decl: &'a TypeDecl) -> Self {
        let mut registry = Self::default();
        for method in decl.methods.iter().filter(|m| m.has_body()) {
            let name = method.name.as_str();
            if registry.methods.insert(name, method).is_none() {
                registry.order.push(name);
            }
        }
        registry
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a MethodDecl> {
        self.methods.get(name).copied()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Registered declarations in declaration order.
    pub fn methods(&self) -> impl Iterator<Item = &'a MethodDecl> + '_ {
        self.order.iter().filter_map(|name| self.get(name))
    }

    /// Public registered methods in declaration order.
    pub fn public_methods(&self) -> impl Iterator<Item = &'a MethodDecl> + '_ {
        self.methods().filter(|m| m.is_public())
    }

    /// Intra-class callees of `name`: invocation names that resolve in the registry.
    ///
    /// Result is a set in first-occurrence order. Unknown `name` yields nothing.
    #[must_use]
    pub fn calls_of(&self, name: &str) -> Vec<&'a str> {
        let Some(method) = self.get(name) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        method
            .invocations
            .iter()
            .filter_map(|inv| self.methods.get_key_value(inv.name.as_str()))
            .map(|(key, _)| *key)
            .filter(|key| seen.insert(*key))
            .collect()
    }

    /// Bare or `this.` calls in `name` with no registered declaration
    /// (inherited, abstract, or otherwise unresolvable on this class).
    #[must_use]
    pub fn unresolved_calls_of(&self, name: &str) -> Vec<String> {
        let Some(method) = self.get(name) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        method
            .invocations
            .iter()
            .filter(|inv| inv.targets_self() && !self.contains(&inv.name))
            .filter(|inv| seen.insert(inv.name.as_str()))
            .map(|inv| inv.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::code::JavaParser;
    use crate::models::declaration::CompilationUnit;

    fn unit(source: &str) -> CompilationUnit {
        JavaParser::new().parse(source).unwrap().unit
    }

    const SOURCE: &str = r#"
public abstract class Billing {
    public void charge() {
        validate();
        repository.save(this.total());
        validate();
        audit();
    }
    private void validate() { check(); }
    int total() { return 1; }
    protected abstract void audit();
    private void check() {}
    private void check(int level) { System.out.println(level); }
}
"#;

    #[test]
    fn registry_skips_bodiless_methods() {
        let unit = unit(SOURCE);
        let registry = MethodRegistry::from_type(unit.primary_type().unwrap());
        assert!(!registry.contains("audit"));
        assert_eq!(registry.len(), 4);
        let names: Vec<_> = registry.methods().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["charge", "validate", "total", "check"]);
        assert_eq!(registry.public_methods().count(), 1);
    }

    #[test]
    fn overloads_resolve_to_the_last_declaration() {
        let unit = unit(SOURCE);
        let registry = MethodRegistry::from_type(unit.primary_type().unwrap());
        assert_eq!(registry.get("check").unwrap().parameters.len(), 1);
    }

    #[test]
    fn calls_are_intersected_with_the_registry() {
        let unit = unit(SOURCE);
        let registry = MethodRegistry::from_type(unit.primary_type().unwrap());
        assert_eq!(registry.calls_of("charge"), vec!["validate", "total"]);
        assert_eq!(registry.calls_of("validate"), vec!["check"]);
        assert!(registry.calls_of("check").is_empty());
        assert!(registry.calls_of("missing").is_empty());
    }

    #[test]
    fn unresolved_self_calls_exclude_qualified_receivers() {
        let unit = unit(SOURCE);
        let registry = MethodRegistry::from_type(unit.primary_type().unwrap());
        assert_eq!(registry.unresolved_calls_of("charge"), vec!["audit"]);
        assert!(registry.unresolved_calls_of("check").is_empty());
    }
}
