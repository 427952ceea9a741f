//! Per-method dependency slicing of a Java class.
//!
//! `extractor` finds method text by brace balance, `callgraph` resolves
//! intra-class calls, `slicer` builds the bundles for one target and
//! `planner` runs the slicer over every public method of a class.

pub mod callgraph;
pub mod extractor;
pub mod planner;
pub mod slicer;

pub use callgraph::MethodRegistry;
pub use planner::{format_plan, method_context, plan_class, plan_files, plan_source};
pub use slicer::ClassSlicer;
