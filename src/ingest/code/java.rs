use tree_sitter::{Language, Node, Parser, Tree};

use crate::error::{PunitoError, Result};
use crate::ingest::code::{find_error_lines, ParseQuality};
use crate::models::declaration::{
    CompilationUnit, FieldDecl, Invocation, MethodDecl, Parameter, TypeDecl, TypeKind,
};

/// Parsed compilation unit plus how cleanly tree-sitter got through it.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub unit: CompilationUnit,
    pub quality: ParseQuality,
}

pub struct JavaParser {
    language: Language,
}

impl Default for JavaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl JavaParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            language: tree_sitter_java::LANGUAGE.into(),
        }
    }

    fn make_parser(&self) -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .map_err(|e| PunitoError::Parse {
                path: String::new(),
                detail: format!("failed to set Java language: {e}"),
            })?;
        Ok(parser)
    }

    fn parse_tree(&self, source: &str) -> Result<Tree> {
        let mut parser = self.make_parser()?;
        parser.parse(source, None).ok_or_else(|| PunitoError::Parse {
            path: String::new(),
            detail: "tree-sitter parse returned None".into(),
        })
    }

    /// Parse source text into a declaration tree.
    pub fn parse(&self, source: &str) -> Result<ParseResult> {
        let tree = self.parse_tree(source)?;
        let root = tree.root_node();
        let unit = collect_unit(root, source.as_bytes());

        let quality = if root.has_error() {
            let error_lines = find_error_lines(root);
            ParseQuality::Partial {
                error_count: error_lines.len(),
                error_lines,
            }
        } else {
            ParseQuality::Complete
        };

        Ok(ParseResult { unit, quality })
    }

    /// Returns true if the source parses without errors.
    #[must_use]
    pub fn validate_syntax(&self, source: &str) -> bool {
        match self.parse_tree(source) {
            Ok(tree) => !tree.root_node().has_error(),
            Err(_) => false,
        }
    }
}

fn text<'a>(node: Node, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn collect_unit(root: Node, source: &[u8]) -> CompilationUnit {
    let mut unit = CompilationUnit::default();
    for child in children(root) {
        match child.kind() {
            "package_declaration" => {
                unit.package = Some(collapse_whitespace(text(child, source)));
            }
            "import_declaration" => {
                unit.imports.push(collapse_whitespace(text(child, source)));
            }
            "class_declaration" | "interface_declaration" | "enum_declaration" => {
                collect_type(child, None, source, &mut unit.types);
            }
            _ => {}
        }
    }
    unit
}

fn type_kind(node_kind: &str) -> Option<TypeKind> {
    match node_kind {
        "class_declaration" => Some(TypeKind::Class),
        "interface_declaration" => Some(TypeKind::Interface),
        "enum_declaration" => Some(TypeKind::Enum),
        _ => None,
    }
}

fn collect_type(node: Node, parent: Option<&str>, source: &[u8], out: &mut Vec<TypeDecl>) {
    let Some(kind) = type_kind(node.kind()) else {
        return;
    };
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = text(name_node, source).to_string();
    let body = node.child_by_field_name("body");

    let signature = match body {
        Some(b) => {
            let bytes = &source[node.start_byte()..b.start_byte()];
            String::from_utf8_lossy(bytes).trim().to_string()
        }
        None => text(node, source)
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .to_string(),
    };
    let (_, annotations) = collect_modifiers(node, source);
    let superclass = node
        .child_by_field_name("superclass")
        .map(|s| collapse_whitespace(text(s, source)));

    let mut decl = TypeDecl {
        name: name.clone(),
        kind,
        parent: parent.map(str::to_string),
        signature,
        annotations,
        superclass,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        fields: Vec::new(),
        methods: Vec::new(),
    };

    let mut nested = Vec::new();
    if let Some(body) = body {
        for member in body_members(body) {
            match member.kind() {
                "field_declaration" | "constant_declaration" => {
                    decl.fields.push(collect_field(member, source));
                }
                "method_declaration" => {
                    if let Some(method) = collect_method(member, &name, source) {
                        decl.methods.push(method);
                    }
                }
                k if type_kind(k).is_some() => nested.push(member),
                _ => {}
            }
        }
    }

    out.push(decl);
    for n in nested {
        collect_type(n, Some(&name), source, out);
    }
}

/// Members of a class/interface/enum body; enum constants are skipped.
fn body_members(body: Node) -> Vec<Node> {
    let mut members = Vec::new();
    for child in children(body) {
        if child.kind() == "enum_body_declarations" {
            members.extend(children(child));
        } else {
            members.push(child);
        }
    }
    members
}

/// Split a declaration's `modifiers` child into keywords and annotations.
fn collect_modifiers(node: Node, source: &[u8]) -> (Vec<String>, Vec<String>) {
    let mut keywords = Vec::new();
    let mut annotations = Vec::new();
    let Some(modifiers) = children(node).into_iter().find(|c| c.kind() == "modifiers") else {
        return (keywords, annotations);
    };
    for m in children(modifiers) {
        match m.kind() {
            "marker_annotation" | "annotation" => {
                annotations.push(collapse_whitespace(text(m, source)));
            }
            "line_comment" | "block_comment" => {}
            _ => keywords.push(text(m, source).to_string()),
        }
    }
    (keywords, annotations)
}

fn collect_field(node: Node, source: &[u8]) -> FieldDecl {
    let (modifiers, annotations) = collect_modifiers(node, source);
    let type_text = node
        .child_by_field_name("type")
        .map(|t| collapse_whitespace(text(t, source)))
        .unwrap_or_default();

    let mut cursor = node.walk();
    let names = node
        .children_by_field_name("declarator", &mut cursor)
        .filter_map(|d| d.child_by_field_name("name"))
        .map(|n| text(n, source).to_string())
        .collect();

    FieldDecl {
        names,
        type_text,
        modifiers,
        annotations,
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
    }
}

fn collect_method(node: Node, owner: &str, source: &[u8]) -> Option<MethodDecl> {
    let name = text(node.child_by_field_name("name")?, source).to_string();
    let (modifiers, annotations) = collect_modifiers(node, source);

    let parameters = node
        .child_by_field_name("parameters")
        .map(|params| {
            children(params)
                .into_iter()
                .filter_map(|p| collect_parameter(p, source))
                .collect()
        })
        .unwrap_or_default();

    let body_node = node.child_by_field_name("body");
    let invocations = body_node
        .map(|b| collect_invocations(b, source))
        .unwrap_or_default();

    Some(MethodDecl {
        name,
        owner: owner.to_string(),
        modifiers,
        annotations,
        parameters,
        body: body_node.map(|b| text(b, source).to_string()),
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        invocations,
    })
}

fn collect_parameter(node: Node, source: &[u8]) -> Option<Parameter> {
    match node.kind() {
        "formal_parameter" => Some(Parameter {
            name: text(node.child_by_field_name("name")?, source).to_string(),
            type_text: node
                .child_by_field_name("type")
                .map(|t| collapse_whitespace(text(t, source)))
                .unwrap_or_default(),
        }),
        "spread_parameter" => {
            let kids = children(node);
            let declarator = kids.iter().find(|c| c.kind() == "variable_declarator")?;
            let type_text = kids
                .iter()
                .find(|c| c.is_named() && c.kind() != "variable_declarator" && c.kind() != "modifiers")
                .map(|t| format!("{}...", collapse_whitespace(text(*t, source))))
                .unwrap_or_default();
            Some(Parameter {
                name: text(declarator.child_by_field_name("name")?, source).to_string(),
                type_text,
            })
        }
        _ => None,
    }
}

/// Depth-first walk over a body collecting every method invocation.
fn collect_invocations(body: Node, source: &[u8]) -> Vec<Invocation> {
    let mut found = Vec::new();
    let mut stack = vec![body];
    while let Some(node) = stack.pop() {
        if node.kind() == "method_invocation" {
            if let Some(name) = node.child_by_field_name("name") {
                found.push(Invocation {
                    name: text(name, source).to_string(),
                    receiver: node
                        .child_by_field_name("object")
                        .map(|o| collapse_whitespace(text(o, source))),
                });
            }
        }
        let mut kids = children(node);
        kids.reverse();
        stack.extend(kids);
    }
    found
}
