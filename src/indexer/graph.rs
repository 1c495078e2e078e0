//! Cross-file resolution of call sites into a call graph and a file
//! dependency graph.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::scanner::FileScan;
use crate::db::models::{
    AnalysisResult, DependencyType, FileDependency, FunctionCall, FunctionDefinition,
};

/// Collects per-file scans, then resolves calls by name only.
///
/// A callee defined in several files produces one `call` dependency per
/// defining file. When a pair of files is linked by both an `#include` and
/// a call, the edge keeps the `include` type.
#[derive(Debug, Default)]
pub struct CallGraphBuilder {
    definitions: Vec<FunctionDefinition>,
    calls: Vec<FunctionCall>,
    includes: Vec<(String, Vec<String>)>,
}

impl CallGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, file: &str, scan: FileScan) {
        self.definitions.extend(scan.definitions);
        self.calls.extend(scan.calls);
        if !scan.includes.is_empty() {
            self.includes.push((file.to_string(), scan.includes));
        }
    }

    pub fn build(self) -> AnalysisResult {
        let CallGraphBuilder {
            definitions,
            mut calls,
            includes,
        } = self;

        let mut by_name: HashMap<&str, Vec<&FunctionDefinition>> = HashMap::new();
        for def in &definitions {
            by_name.entry(def.name.as_str()).or_default().push(def);
        }
        for defs in by_name.values_mut() {
            defs.sort_by(|a, b| {
                a.file_path
                    .cmp(&b.file_path)
                    .then(a.line_number.cmp(&b.line_number))
            });
        }

        let mut edges: BTreeMap<(String, String), DependencyType> = BTreeMap::new();
        for (source, targets) in includes {
            for target in targets {
                edges.insert((source.clone(), target), DependencyType::Include);
            }
        }

        let mut resolved = 0usize;
        for call in &mut calls {
            let Some(defs) = by_name.get(call.called_function.as_str()) else {
                continue;
            };
            resolved += 1;

            let target = defs
                .iter()
                .find(|d| d.file_path == call.caller_file)
                .or_else(|| defs.first())
                .map(|d| d.file_path.clone());
            call.called_file = target;

            for def in defs {
                if def.file_path != call.caller_file {
                    edges
                        .entry((call.caller_file.clone(), def.file_path.clone()))
                        .or_insert(DependencyType::Call);
                }
            }
        }

        debug!(
            "Resolved {resolved} of {} calls, {} file dependencies",
            calls.len(),
            edges.len()
        );

        let dependencies = edges
            .into_iter()
            .map(|((source_file, target_file), dependency_type)| FileDependency {
                source_file,
                target_file,
                dependency_type,
            })
            .collect();

        AnalysisResult {
            definitions,
            calls,
            dependencies,
        }
    }
}
