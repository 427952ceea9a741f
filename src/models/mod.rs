pub mod bundle;
pub mod declaration;

pub use bundle::{Bundle, ChunkPlan, DependencyMap};
pub use declaration::{CompilationUnit, FieldDecl, Invocation, MethodDecl, TypeDecl, TypeKind};
