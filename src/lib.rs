//! # cproject-graph: C/C++ project preprocessing and call graph analysis
//!
//! Two independent pipelines over one source tree:
//!
//! `source tree → classify → pair → concurrent copy → cache tree + report`
//!
//! `source tree → lexical scan → call graph → SQLite store → queries`
//!
//! ## Architecture
//!
//! - **[`config`]**: Configuration loading, defaults and validation
//! - **[`preprocess`]**: Tree scan, source/header pairing, bounded copy pool, processing reports
//! - **[`indexer`]**: Heuristic definition/call/include scanner and call graph builder
//! - **[`db`]**: Relation store (schema, transactional save) and graph queries
//! - **[`error`]**: Error taxonomy
//! - **[`retry`]**: Exponential backoff policy for store reconnection

pub mod config;
pub mod db;
pub mod error;
pub mod indexer;
pub mod preprocess;
pub mod retry;
