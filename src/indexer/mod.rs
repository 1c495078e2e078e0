//! Call relation analysis: lexical scanning, cross-file resolution and the
//! sequential project walk that ties them together.

pub mod core;
pub mod graph;
pub mod scanner;

pub use self::core::RelationAnalyzer;
pub use graph::CallGraphBuilder;
pub use scanner::{CodeScanner, FileScan, LexicalScanner};
