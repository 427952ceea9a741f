pub mod code;
pub mod hasher;
pub mod source;

pub use source::{read_class_file, SourceClass};
