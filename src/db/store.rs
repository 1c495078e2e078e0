use rusqlite::params;
use tracing::info;

use super::RelationStore;
use super::models::{AnalysisResult, SaveSummary};
use crate::error::StoreError;

impl RelationStore {
    /// Persist one analysis pass for `project` in a single transaction.
    ///
    /// Definitions and dependencies are upserted on their unique keys; call
    /// sites are appended as-is.
    pub fn save(&mut self, result: &AnalysisResult, project: &str) -> Result<SaveSummary, StoreError> {
        let conn = self.writer()?;
        let tx = conn.transaction()?;

        {
            let mut def_stmt = tx.prepare_cached(
                r#"
                INSERT INTO function_definitions
                    (function_name, file_path, line_number, return_type, parameters, signature, project_name)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(function_name, file_path, project_name) DO UPDATE SET
                    line_number = excluded.line_number,
                    return_type = excluded.return_type,
                    parameters = excluded.parameters,
                    signature = excluded.signature,
                    created_at = CURRENT_TIMESTAMP
                "#,
            )?;
            for def in &result.definitions {
                def_stmt.execute(params![
                    def.name,
                    def.file_path,
                    def.line_number as i64,
                    def.return_type,
                    def.parameters,
                    def.signature,
                    project,
                ])?;
            }

            let mut call_stmt = tx.prepare_cached(
                r#"
                INSERT INTO function_calls
                    (caller_file, caller_function, caller_line, called_function, called_file, project_name)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for call in &result.calls {
                call_stmt.execute(params![
                    call.caller_file,
                    call.caller_function,
                    call.caller_line as i64,
                    call.called_function,
                    call.called_file,
                    project,
                ])?;
            }

            let mut dep_stmt = tx.prepare_cached(
                r#"
                INSERT INTO file_dependencies (source_file, target_file, dependency_type, project_name)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(source_file, target_file, project_name) DO UPDATE SET
                    dependency_type = excluded.dependency_type,
                    created_at = CURRENT_TIMESTAMP
                "#,
            )?;
            for dep in &result.dependencies {
                dep_stmt.execute(params![
                    dep.source_file,
                    dep.target_file,
                    dep.dependency_type.as_str(),
                    project,
                ])?;
            }
        }

        tx.commit()?;

        let summary = SaveSummary {
            definitions: result.definitions.len(),
            calls: result.calls.len(),
            dependencies: result.dependencies.len(),
        };
        info!(
            "Saved {} function definitions, {} function calls and {} file dependencies for {project}",
            summary.definitions, summary.calls, summary.dependencies
        );
        Ok(summary)
    }

    /// Delete every row belonging to `project`. Returns the number of rows removed.
    pub fn clear_project(&mut self, project: &str) -> Result<usize, StoreError> {
        let conn = self.writer()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        for table in ["function_definitions", "function_calls", "file_dependencies"] {
            removed += tx.execute(
                &format!("DELETE FROM {table} WHERE project_name = ?1"),
                params![project],
            )?;
        }
        tx.commit()?;
        info!("Cleared {removed} rows for project {project}");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{DependencyType, FileDependency, FunctionCall, FunctionDefinition};

    fn def(name: &str, file: &str, line: usize) -> FunctionDefinition {
        FunctionDefinition {
            name: name.into(),
            file_path: file.into(),
            line_number: line,
            return_type: "int".into(),
            parameters: String::new(),
            signature: format!("int {name}()"),
        }
    }

    fn call(caller: Option<&str>, callee: &str) -> FunctionCall {
        FunctionCall {
            caller_file: "main.c".into(),
            caller_function: caller.map(String::from),
            caller_line: 3,
            called_function: callee.into(),
            called_file: None,
        }
    }

    fn count(store: &mut RelationStore, sql: &str) -> usize {
        store
            .writer()
            .unwrap()
            .query_row(sql, [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_definitions_and_dependencies_upsert_calls_append() {
        let mut store = RelationStore::open_in_memory().unwrap();
        let result = AnalysisResult {
            definitions: vec![def("main", "main.c", 1), def("add", "math.c", 1)],
            calls: vec![call(Some("main"), "add")],
            dependencies: vec![FileDependency {
                source_file: "main.c".into(),
                target_file: "math.c".into(),
                dependency_type: DependencyType::Call,
            }],
        };

        store.save(&result, "demo").unwrap();
        let mut moved = result.clone();
        moved.definitions[1].line_number = 7;
        moved.dependencies[0].dependency_type = DependencyType::Include;
        store.save(&moved, "demo").unwrap();

        assert_eq!(count(&mut store, "SELECT count(*) FROM function_definitions"), 2);
        assert_eq!(count(&mut store, "SELECT count(*) FROM function_calls"), 2);
        assert_eq!(count(&mut store, "SELECT count(*) FROM file_dependencies"), 1);
        assert_eq!(
            count(
                &mut store,
                "SELECT line_number FROM function_definitions WHERE function_name = 'add'"
            ),
            7
        );
        let dep_type: String = store
            .writer()
            .unwrap()
            .query_row("SELECT dependency_type FROM file_dependencies", [], |r| r.get(0))
            .unwrap();
        assert_eq!(dep_type, "include");
    }

    #[test]
    fn test_clear_project_only_touches_that_project() {
        let mut store = RelationStore::open_in_memory().unwrap();
        let result = AnalysisResult {
            definitions: vec![def("f", "a.c", 1)],
            calls: vec![call(None, "f")],
            dependencies: vec![],
        };
        store.save(&result, "one").unwrap();
        store.save(&result, "two").unwrap();

        assert_eq!(store.clear_project("one").unwrap(), 2);
        assert_eq!(count(&mut store, "SELECT count(*) FROM function_definitions"), 1);
        assert_eq!(count(&mut store, "SELECT count(*) FROM function_calls"), 1);
    }

    #[test]
    fn test_save_on_closed_external_connection_fails() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let mut store = RelationStore::with_connection(conn).unwrap();
        store.close();
        let err = store.save(&AnalysisResult::default(), "p").unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
