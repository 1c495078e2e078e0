//! Read-side graph queries. Every query returns an empty value instead of
//! an error when the store is unavailable or the query fails.

use std::collections::{BTreeSet, HashMap, HashSet};

use rusqlite::{Connection, Result, Row, params};

use super::RelationStore;
use super::models::*;

pub const DEFAULT_CHAIN_DEPTH: usize = 3;
const TOP_FILES: usize = 10;

const DEFINITION_COLUMNS: &str =
    "function_name, file_path, line_number, return_type, parameters, signature";
const CALL_COLUMNS: &str =
    "caller_file, caller_function, caller_line, called_function, called_file";

fn map_definition(row: &Row<'_>) -> Result<FunctionDefinition> {
    Ok(FunctionDefinition {
        name: row.get(0)?,
        file_path: row.get(1)?,
        line_number: row.get::<_, Option<i64>>(2)?.unwrap_or(0) as usize,
        return_type: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        parameters: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        signature: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
    })
}

fn map_call(row: &Row<'_>) -> Result<FunctionCall> {
    Ok(FunctionCall {
        caller_file: row.get(0)?,
        caller_function: row.get(1)?,
        caller_line: row.get::<_, Option<i64>>(2)?.unwrap_or(0) as usize,
        called_function: row.get(3)?,
        called_file: row.get(4)?,
    })
}

/// `%keyword%` with LIKE wildcards in `keyword` escaped (use `ESCAPE '\'`).
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn query_definitions(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<FunctionDefinition>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, map_definition)?;
    rows.collect()
}

fn query_calls(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<FunctionCall>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, map_call)?;
    rows.collect()
}

fn count(conn: &Connection, sql: &str, project: &str) -> Result<usize> {
    conn.query_row(sql, params![project], |row| row.get(0))
}

fn call_chain(
    conn: &Connection,
    project: &str,
    function: &str,
    remaining: usize,
    max_depth: usize,
    mut visited: HashSet<String>,
) -> Result<Vec<CallChainNode>> {
    if remaining == 0 || visited.contains(function) {
        return Ok(Vec::new());
    }
    visited.insert(function.to_string());

    let callees: Vec<(String, String, usize)> = {
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT called_function, caller_file, caller_line FROM function_calls
            WHERE project_name = ?1 AND caller_function = ?2
            ORDER BY caller_file, caller_line, id
            "#,
        )?;
        let rows = stmt.query_map(params![project, function], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get::<_, Option<i64>>(2)?.unwrap_or(0) as usize,
            ))
        })?;
        rows.collect::<Result<_>>()?
    };

    let mut nodes = Vec::with_capacity(callees.len());
    for (callee, file, line) in callees {
        // each branch carries its own copy of the path visited so far
        let children = call_chain(conn, project, &callee, remaining - 1, max_depth, visited.clone())?;
        nodes.push(CallChainNode {
            function: callee,
            file,
            line,
            depth: max_depth - remaining + 1,
            children,
        });
    }
    Ok(nodes)
}

fn top_by_count(counts: HashMap<&str, usize>) -> Vec<FileDegree> {
    let mut ranked: Vec<FileDegree> = counts
        .into_iter()
        .map(|(file, count)| FileDegree {
            file: file.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.file.cmp(&b.file)));
    ranked.truncate(TOP_FILES);
    ranked
}

impl RelationStore {
    /// Projects with at least one stored definition.
    pub fn list_projects(&mut self) -> Vec<String> {
        self.read_or_default("list projects", |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT project_name FROM function_definitions WHERE project_name IS NOT NULL ORDER BY project_name",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })
    }

    pub fn get_project_statistics(&mut self, project: &str) -> ProjectStatistics {
        self.read_or_default("project statistics", |conn| {
            Ok(ProjectStatistics {
                function_definitions: count(
                    conn,
                    "SELECT COUNT(*) FROM function_definitions WHERE project_name = ?1",
                    project,
                )?,
                function_calls: count(
                    conn,
                    "SELECT COUNT(*) FROM function_calls WHERE project_name = ?1",
                    project,
                )?,
                file_dependencies: count(
                    conn,
                    "SELECT COUNT(*) FROM file_dependencies WHERE project_name = ?1",
                    project,
                )?,
                unique_files: count(
                    conn,
                    "SELECT COUNT(DISTINCT file_path) FROM function_definitions WHERE project_name = ?1",
                    project,
                )?,
            })
        })
    }

    /// Caller → callee graph, optionally restricted to calls made by or to
    /// `function`.
    pub fn get_function_call_graph(&mut self, project: &str, function: Option<&str>) -> CallGraph {
        self.read_or_default("function call graph", |conn| {
            let mut sql = String::from(
                r#"
                SELECT fc.caller_file, fc.caller_function, fc.caller_line, fc.called_function, fc.called_file,
                       (SELECT fd.line_number FROM function_definitions fd
                        WHERE fd.project_name = fc.project_name AND fd.function_name = fc.called_function
                        ORDER BY fd.file_path IS NOT fc.called_file, fd.file_path, fd.line_number
                        LIMIT 1) AS def_line
                FROM function_calls fc
                WHERE fc.project_name = ?1
                "#,
            );
            if function.is_some() {
                sql.push_str(" AND (fc.called_function = ?2 OR fc.caller_function = ?2)");
            }
            sql.push_str(" ORDER BY fc.id");

            let mut stmt = conn.prepare(&sql)?;
            let map = |row: &Row<'_>| -> Result<(FunctionCall, Option<usize>)> {
                Ok((
                    map_call(row)?,
                    row.get::<_, Option<i64>>(5)?.map(|l| l as usize),
                ))
            };
            let rows: Vec<(FunctionCall, Option<usize>)> = match function {
                Some(f) => stmt.query_map(params![project, f], map)?.collect::<Result<_>>()?,
                None => stmt.query_map(params![project], map)?.collect::<Result<_>>()?,
            };

            let mut graph = CallGraph::default();
            for (call, def_line) in rows {
                let caller = call
                    .caller_function
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());
                graph
                    .nodes
                    .entry(caller.clone())
                    .or_insert_with(|| CallGraphNode {
                        name: caller.clone(),
                        file: call.caller_file.clone(),
                        def_line: None,
                        role: NodeRole::Caller,
                    });
                graph
                    .nodes
                    .entry(call.called_function.clone())
                    .or_insert_with(|| CallGraphNode {
                        name: call.called_function.clone(),
                        file: call
                            .called_file
                            .clone()
                            .unwrap_or_else(|| "unknown".to_string()),
                        def_line,
                        role: NodeRole::Called,
                    });
                graph.edges.push(CallGraphEdge {
                    from: caller,
                    to: call.called_function,
                    file: call.caller_file,
                    line: call.caller_line,
                });
            }
            Ok(graph)
        })
    }

    /// Tree of callees below `function`, at most `max_depth` levels deep.
    ///
    /// A function is not expanded again below itself, but it can show up on
    /// several sibling branches.
    pub fn get_function_call_chain(&mut self, project: &str, function: &str, max_depth: usize) -> CallChain {
        self.read_or_default("function call chain", |conn| {
            Ok(CallChain {
                root_function: function.to_string(),
                max_depth,
                call_tree: call_chain(conn, project, function, max_depth, max_depth, HashSet::new())?,
            })
        })
    }

    /// Callees ranked by number of call sites, descending.
    pub fn get_most_called_functions(&mut self, project: &str, limit: usize) -> Vec<CalledFunction> {
        self.read_or_default("most called functions", |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT called_function, COUNT(*) AS call_count
                FROM function_calls
                WHERE project_name = ?1
                GROUP BY called_function
                ORDER BY call_count DESC, called_function ASC
                LIMIT ?2
                "#,
            )?;
            let rows = stmt.query_map(params![project, limit as i64], |row| {
                Ok(CalledFunction {
                    function: row.get(0)?,
                    call_count: row.get(1)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Callers ranked by number of distinct callees (fan-out), descending.
    pub fn get_most_complex_functions(&mut self, project: &str, limit: usize) -> Vec<ComplexFunction> {
        self.read_or_default("most complex functions", |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT caller_function, COUNT(DISTINCT called_function) AS called_count
                FROM function_calls
                WHERE project_name = ?1 AND caller_function IS NOT NULL
                GROUP BY caller_function
                ORDER BY called_count DESC, caller_function ASC
                LIMIT ?2
                "#,
            )?;
            let rows = stmt.query_map(params![project, limit as i64], |row| {
                Ok(ComplexFunction {
                    function: row.get(0)?,
                    calls_made: row.get(1)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Out-degree and in-degree rankings of files, keyed by basename.
    pub fn get_file_dependency_analysis(&mut self, project: &str) -> FileDependencyAnalysis {
        self.read_or_default("file dependency analysis", |conn| {
            let mut stmt = conn.prepare(
                "SELECT source_file, target_file FROM file_dependencies WHERE project_name = ?1",
            )?;
            let deps: Vec<(String, String)> = stmt
                .query_map(params![project], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<_>>()?;

            let mut out_degree: HashMap<&str, usize> = HashMap::new();
            let mut in_degree: HashMap<&str, usize> = HashMap::new();
            for (source, target) in &deps {
                *out_degree.entry(basename(source)).or_default() += 1;
                *in_degree.entry(basename(target)).or_default() += 1;
            }

            Ok(FileDependencyAnalysis {
                total_dependencies: deps.len(),
                unique_source_files: out_degree.len(),
                unique_target_files: in_degree.len(),
                most_dependent_files: top_by_count(out_degree),
                most_depended_files: top_by_count(in_degree),
            })
        })
    }

    /// Substring search over definition names, signatures and files, and
    /// over call callee, caller and caller-file names.
    pub fn search_function_usage(&mut self, project: &str, keyword: &str) -> UsageSearch {
        self.read_or_default("search function usage", |conn| {
            let pattern = like_pattern(keyword);
            let definitions = query_definitions(
                conn,
                &format!(
                    r#"
                    SELECT {DEFINITION_COLUMNS} FROM function_definitions
                    WHERE project_name = ?1 AND (
                        function_name LIKE ?2 ESCAPE '\' OR
                        signature LIKE ?2 ESCAPE '\' OR
                        file_path LIKE ?2 ESCAPE '\'
                    )
                    ORDER BY file_path, line_number
                    "#
                ),
                params![project, pattern],
            )?;
            let calls = query_calls(
                conn,
                &format!(
                    r#"
                    SELECT {CALL_COLUMNS} FROM function_calls
                    WHERE project_name = ?1 AND (
                        called_function LIKE ?2 ESCAPE '\' OR
                        caller_function LIKE ?2 ESCAPE '\' OR
                        caller_file LIKE ?2 ESCAPE '\'
                    )
                    ORDER BY id
                    "#
                ),
                params![project, pattern],
            )?;
            Ok(UsageSearch {
                keyword: keyword.to_string(),
                definitions_found: definitions.len(),
                calls_found: calls.len(),
                definitions,
                calls,
            })
        })
    }

    /// Definitions whose name contains `name`.
    pub fn find_function_definitions(&mut self, project: &str, name: &str) -> Vec<FunctionDefinition> {
        self.read_or_default("find function definitions", |conn| {
            query_definitions(
                conn,
                &format!(
                    "SELECT {DEFINITION_COLUMNS} FROM function_definitions \
                     WHERE project_name = ?1 AND function_name LIKE ?2 ESCAPE '\\' \
                     ORDER BY file_path, line_number"
                ),
                params![project, like_pattern(name)],
            )
        })
    }

    /// Call sites whose callee name contains `name`.
    pub fn find_function_calls(&mut self, project: &str, name: &str) -> Vec<FunctionCall> {
        self.read_or_default("find function calls", |conn| {
            query_calls(
                conn,
                &format!(
                    "SELECT {CALL_COLUMNS} FROM function_calls \
                     WHERE project_name = ?1 AND called_function LIKE ?2 ESCAPE '\\' \
                     ORDER BY id"
                ),
                params![project, like_pattern(name)],
            )
        })
    }

    /// Definitions in `file_path`, the calls it makes, and the calls other
    /// files make into it. Files are matched by basename.
    pub fn get_file_call_relationships(&mut self, project: &str, file_path: &str) -> FileCallRelationships {
        self.read_or_default("file call relationships", |conn| {
            let pattern = like_pattern(basename(file_path));
            let defined_functions = query_definitions(
                conn,
                &format!(
                    "SELECT {DEFINITION_COLUMNS} FROM function_definitions \
                     WHERE project_name = ?1 AND file_path LIKE ?2 ESCAPE '\\' \
                     ORDER BY file_path, line_number"
                ),
                params![project, pattern],
            )?;
            let internal_calls = query_calls(
                conn,
                &format!(
                    "SELECT {CALL_COLUMNS} FROM function_calls \
                     WHERE project_name = ?1 AND caller_file LIKE ?2 ESCAPE '\\' \
                     ORDER BY id"
                ),
                params![project, pattern],
            )?;

            let names: BTreeSet<&str> = defined_functions.iter().map(|d| d.name.as_str()).collect();
            let mut external_calls = Vec::new();
            for name in names {
                external_calls.extend(query_calls(
                    conn,
                    &format!(
                        "SELECT {CALL_COLUMNS} FROM function_calls \
                         WHERE project_name = ?1 AND called_function = ?2 \
                         AND caller_file NOT LIKE ?3 ESCAPE '\\' ORDER BY id"
                    ),
                    params![project, name, pattern],
                )?);
            }

            Ok(FileCallRelationships {
                file_path: file_path.to_string(),
                defined_functions,
                internal_calls,
                external_calls,
            })
        })
    }

    /// Dependency edges of the project, or only those touching `file_path`.
    pub fn get_file_dependencies(&mut self, project: &str, file_path: Option<&str>) -> DependencyGraph {
        self.read_or_default("file dependencies", |conn| {
            let base = "SELECT source_file, target_file, dependency_type FROM file_dependencies WHERE project_name = ?1";
            let map = |row: &Row<'_>| -> Result<FileDependency> {
                let kind: Option<String> = row.get(2)?;
                Ok(FileDependency {
                    source_file: row.get(0)?,
                    target_file: row.get(1)?,
                    dependency_type: kind
                        .as_deref()
                        .and_then(DependencyType::parse)
                        .unwrap_or(DependencyType::Call),
                })
            };
            let edges: Vec<FileDependency> = match file_path {
                Some(file) => {
                    let sql = format!("{base} AND (source_file = ?2 OR target_file = ?2) ORDER BY id");
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(params![project, file], map)?.collect::<Result<_>>()?
                }
                None => {
                    let sql = format!("{base} ORDER BY id");
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(params![project], map)?.collect::<Result<_>>()?
                }
            };

            let nodes: BTreeSet<&str> = edges
                .iter()
                .flat_map(|e| [e.source_file.as_str(), e.target_file.as_str()])
                .collect();
            Ok(DependencyGraph {
                nodes: nodes.into_iter().map(String::from).collect(),
                edges,
            })
        })
    }

    /// Definitions of, calls to, and calls made by `function`.
    pub fn get_function_usage_summary(&mut self, project: &str, function: &str) -> FunctionUsageSummary {
        let definitions = self.find_function_definitions(project, function);
        let called_by = self.find_function_calls(project, function);
        let calls_made = self.read_or_default("function usage summary", |conn| {
            count_calls_made(conn, project, function)
        });
        FunctionUsageSummary {
            definition_count: definitions.len(),
            called_count: called_by.len(),
            calls_made,
            called_by,
            definitions,
        }
    }
}

fn count_calls_made(conn: &Connection, project: &str, function: &str) -> Result<usize> {
    conn.query_row(
        "SELECT COUNT(*) FROM function_calls WHERE project_name = ?1 AND caller_function = ?2",
        params![project, function],
        |row| row.get(0),
    )
}
