use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Analysis output ──────────────────────────────────────────────────

/// A function definition found by the scanner. Paths are relative to the
/// project root and `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub file_path: String,
    /// 1-based
    pub line_number: usize,
    pub return_type: String,
    /// Raw parameter text between the parentheses
    pub parameters: String,
    pub signature: String,
}

/// One observed call site. Never deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub caller_file: String,
    /// `None` for calls outside any function body
    pub caller_function: Option<String>,
    pub caller_line: usize,
    pub called_function: String,
    /// Filled in once the callee is resolved to a definition
    pub called_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    Include,
    Call,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::Include => "include",
            DependencyType::Call => "call",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "include" => Some(DependencyType::Include),
            "call" => Some(DependencyType::Call),
            _ => None,
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDependency {
    pub source_file: String,
    pub target_file: String,
    pub dependency_type: DependencyType,
}

/// Everything one analysis pass produced, saved in a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub definitions: Vec<FunctionDefinition>,
    pub calls: Vec<FunctionCall>,
    pub dependencies: Vec<FileDependency>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub definitions: usize,
    pub calls: usize,
    pub dependencies: usize,
}

// ── Query results ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectStatistics {
    pub function_definitions: usize,
    pub function_calls: usize,
    pub file_dependencies: usize,
    /// Distinct files holding at least one definition
    pub unique_files: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Caller,
    Called,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallGraphNode {
    pub name: String,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub def_line: Option<usize>,
    #[serde(rename = "type")]
    pub role: NodeRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallGraphEdge {
    pub from: String,
    pub to: String,
    pub file: String,
    pub line: usize,
}

/// Nodes are keyed by function name; the first sighting decides the role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallGraph {
    pub nodes: BTreeMap<String, CallGraphNode>,
    pub edges: Vec<CallGraphEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallChainNode {
    pub function: String,
    /// File holding the call site
    pub file: String,
    pub line: usize,
    /// 1 for direct callees of the root
    pub depth: usize,
    pub children: Vec<CallChainNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallChain {
    pub root_function: String,
    pub max_depth: usize,
    pub call_tree: Vec<CallChainNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalledFunction {
    pub function: String,
    pub call_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplexFunction {
    pub function: String,
    /// Distinct callees
    pub calls_made: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDegree {
    /// Basename
    pub file: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileDependencyAnalysis {
    pub total_dependencies: usize,
    pub unique_source_files: usize,
    pub unique_target_files: usize,
    /// Highest out-degree first
    pub most_dependent_files: Vec<FileDegree>,
    /// Highest in-degree first
    pub most_depended_files: Vec<FileDegree>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageSearch {
    pub keyword: String,
    pub definitions_found: usize,
    pub calls_found: usize,
    pub definitions: Vec<FunctionDefinition>,
    pub calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileCallRelationships {
    pub file_path: String,
    pub defined_functions: Vec<FunctionDefinition>,
    /// Calls made from inside the file
    pub internal_calls: Vec<FunctionCall>,
    /// Calls from other files into functions defined here
    pub external_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<FileDependency>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionUsageSummary {
    pub definition_count: usize,
    pub called_count: usize,
    pub calls_made: usize,
    pub called_by: Vec<FunctionCall>,
    pub definitions: Vec<FunctionDefinition>,
}
