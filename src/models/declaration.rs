use serde::Serialize;

/// Kind of a top-level or nested type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
}

/// One parsed Java source file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompilationUnit {
    /// `package a.b.c;` verbatim, if present.
    pub package: Option<String>,
    /// Import declarations, verbatim, in source order.
    pub imports: Vec<String>,
    /// Type declarations in source order (nested types follow their parent).
    pub types: Vec<TypeDecl>,
}

impl CompilationUnit {
    /// The first top-level type, i.e. the class the file is named after.
    #[must_use]
    pub fn primary_type(&self) -> Option<&TypeDecl> {
        self.types.iter().find(|t| t.parent.is_none())
    }

    /// Every method of every type, in source order.
    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.types.iter().flat_map(|t| t.methods.iter())
    }

    /// Import lines joined with newlines.
    #[must_use]
    pub fn imports_text(&self) -> String {
        self.imports.join("\n")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeDecl {
    pub name: String,
    pub kind: TypeKind,
    /// Enclosing type for nested declarations.
    pub parent: Option<String>,
    /// Declaration text up to the opening brace of the body (annotations included).
    pub signature: String,
    /// Annotations in the declaration's modifier list, verbatim.
    pub annotations: Vec<String>,
    /// `extends X` clause verbatim.
    pub superclass: Option<String>,
    /// 1-based.
    pub start_line: usize,
    pub end_line: usize,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
}

impl TypeDecl {
    /// Names of all variables declared by this type's fields.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .flat_map(|f| f.names.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldDecl {
    /// Declared variable names (`int a, b;` declares two).
    pub names: Vec<String>,
    pub type_text: String,
    pub modifiers: Vec<String>,
    pub annotations: Vec<String>,
    /// 1-based; annotation lines included.
    pub start_line: usize,
    pub end_line: usize,
}

impl FieldDecl {
    /// True when any annotation has the given simple name (`Mock` matches `@Mock` and `@org.mockito.Mock`).
    #[must_use]
    pub fn has_annotation(&self, simple_name: &str) -> bool {
        self.annotations
            .iter()
            .any(|a| annotation_simple_name(a) == simple_name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: String,
    pub type_text: String,
}

/// A single method invocation found in a method body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub name: String,
    /// Receiver expression text (`repo` in `repo.save()`), `None` for bare calls.
    pub receiver: Option<String>,
}

impl Invocation {
    /// Bare `foo()` or `this.foo()`: a call that must resolve on the class itself.
    #[must_use]
    pub fn targets_self(&self) -> bool {
        matches!(self.receiver.as_deref(), None | Some("this"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodDecl {
    pub name: String,
    /// Declaring type.
    pub owner: String,
    /// Modifier keywords (`public`, `static`, ...), annotations excluded.
    pub modifiers: Vec<String>,
    pub annotations: Vec<String>,
    pub parameters: Vec<Parameter>,
    /// Body text including the braces; `None` for abstract/native/interface methods.
    pub body: Option<String>,
    /// 1-based line of the first token (annotations included).
    pub start_line: usize,
    pub end_line: usize,
    /// Invocations in the body, depth-first order.
    pub invocations: Vec<Invocation>,
}

impl MethodDecl {
    #[must_use]
    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    #[must_use]
    pub fn is_public(&self) -> bool {
        self.has_modifier("public")
    }

    #[must_use]
    pub fn is_private(&self) -> bool {
        self.has_modifier("private")
    }

    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    #[must_use]
    pub fn has_annotation(&self, simple_name: &str) -> bool {
        self.annotations
            .iter()
            .any(|a| annotation_simple_name(a) == simple_name)
    }
}

/// `@org.junit.Test(expected = X.class)` -> `Test`.
#[must_use]
pub fn annotation_simple_name(annotation: &str) -> &str {
    let name = annotation.trim().trim_start_matches('@');
    let name = name.split('(').next().unwrap_or(name).trim();
    name.rsplit('.').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_simple_name_strips_package_and_arguments() {
        assert_eq!(annotation_simple_name("@Mock"), "Mock");
        assert_eq!(annotation_simple_name("@org.mockito.InjectMocks"), "InjectMocks");
        assert_eq!(
            annotation_simple_name("@Test(expected = IllegalStateException.class)"),
            "Test"
        );
    }

    #[test]
    fn bare_and_this_calls_target_self() {
        let bare = Invocation {
            name: "load".into(),
            receiver: None,
        };
        let this = Invocation {
            name: "load".into(),
            receiver: Some("this".into()),
        };
        let other = Invocation {
            name: "load".into(),
            receiver: Some("repository".into()),
        };
        assert!(bare.targets_self());
        assert!(this.targets_self());
        assert!(!other.targets_self());
    }
}
