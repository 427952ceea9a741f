use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{PunitoError, Result};
use crate::ingest::code::{JavaParser, ParseQuality};
use crate::models::declaration::{CompilationUnit, TypeDecl};

/// A Java class file read from disk and parsed.
#[derive(Debug, Clone)]
pub struct SourceClass {
    pub path: PathBuf,
    /// File stem, e.g. `OrderService` for `OrderService.java`.
    pub class_name: String,
    pub source: String,
    pub unit: CompilationUnit,
    pub quality: ParseQuality,
}

impl SourceClass {
    /// The declaration the file is named after, falling back to the first top-level type.
    #[must_use]
    pub fn primary_type(&self) -> Option<&TypeDecl> {
        self.unit
            .types
            .iter()
            .find(|t| t.parent.is_none() && t.name == self.class_name)
            .or_else(|| self.unit.primary_type())
    }
}

/// Derive the class name from a `.java` path.
pub fn class_name_from_path(path: &Path) -> Result<String> {
    let invalid = || PunitoError::InvalidClassFile {
        path: path.display().to_string(),
    };
    if path.extension().and_then(|e| e.to_str()) != Some("java") {
        return Err(invalid());
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(invalid)
}

/// Parse in-memory source as if it was read from `path`.
pub fn parse_class_source(path: &Path, source: String) -> Result<SourceClass> {
    let class_name = class_name_from_path(path)?;
    let result = JavaParser::new().parse(&source)?;

    if result.unit.primary_type().is_none() {
        return Err(PunitoError::Parse {
            path: path.display().to_string(),
            detail: "no type declaration found".into(),
        });
    }
    if let ParseQuality::Partial { error_lines, .. } = &result.quality {
        warn!(
            path = %path.display(),
            ?error_lines,
            "source has syntax errors, continuing with partial declarations"
        );
    }

    Ok(SourceClass {
        path: path.to_path_buf(),
        class_name,
        source,
        unit: result.unit,
        quality: result.quality,
    })
}

/// Read and parse a Java class file.
pub fn read_class_file(path: &Path) -> Result<SourceClass> {
    // Validate the name before touching the filesystem.
    class_name_from_path(path)?;
    let source = std::fs::read_to_string(path)?;
    parse_class_source(path, source)
}
