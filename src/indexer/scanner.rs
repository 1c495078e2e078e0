//! Line-oriented extraction of function definitions, call sites and
//! `#include` directives.
//!
//! The scanner is heuristic: multi-line signatures, text inside strings or
//! comments and macro-expanded code can all be misread. Callers only see the
//! [`CodeScanner`] trait so a parser-backed implementation can replace it.

use std::collections::HashMap;
use std::path::PathBuf;

use regex::Regex;

use crate::db::models::{FunctionCall, FunctionDefinition};
use crate::preprocess::classifier::relative_slash_path;

const DEFINITION_PATTERN: &str =
    r"^\s*([a-zA-Z_][a-zA-Z0-9_*\s]*)\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*\(([^)]*)\)\s*\{";
const PROTOTYPE_PATTERN: &str =
    r"^\s*[a-zA-Z_][a-zA-Z0-9_*\s]*\s+[a-zA-Z_][a-zA-Z0-9_]*\s*\([^)]*\)\s*;";
const CALL_PATTERN: &str = r"([a-zA-Z_][a-zA-Z0-9_]*)\s*\(";
const INCLUDE_PATTERN: &str = r#"#include\s*[<"]([^>"]+)[>"]"#;

/// Identifiers followed by `(` that are never calls.
const CALL_STOPLIST: [&str; 6] = ["if", "while", "for", "switch", "sizeof", "typeof"];

/// Everything extracted from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileScan {
    pub definitions: Vec<FunctionDefinition>,
    pub calls: Vec<FunctionCall>,
    /// Resolved include targets, relative to the project root
    pub includes: Vec<String>,
}

pub trait CodeScanner {
    /// `file` is the project-relative path stamped on every record.
    fn extract_definitions(&self, file: &str, text: &str) -> Vec<FunctionDefinition>;

    fn extract_calls(&self, file: &str, text: &str) -> Vec<FunctionCall>;

    /// Include targets that resolve to an existing file; the rest are dropped.
    fn extract_includes(&self, text: &str) -> Vec<String>;

    fn scan_file(&self, file: &str, text: &str) -> FileScan {
        FileScan {
            definitions: self.extract_definitions(file, text),
            calls: self.extract_calls(file, text),
            includes: self.extract_includes(text),
        }
    }
}

pub struct LexicalScanner {
    root: PathBuf,
    include_dirs: Vec<String>,
    definition: Regex,
    prototype: Regex,
    call: Regex,
    include: Regex,
}

impl LexicalScanner {
    /// `include_dirs` are tried in order, relative to `root`; `.` is the root itself.
    pub fn new(root: impl Into<PathBuf>, include_dirs: &[String]) -> Result<Self, regex::Error> {
        Ok(Self {
            root: root.into(),
            include_dirs: include_dirs.to_vec(),
            definition: Regex::new(DEFINITION_PATTERN)?,
            prototype: Regex::new(PROTOTYPE_PATTERN)?,
            call: Regex::new(CALL_PATTERN)?,
            include: Regex::new(INCLUDE_PATTERN)?,
        })
    }

    fn resolve_include(&self, target: &str) -> Option<String> {
        self.include_dirs.iter().find_map(|dir| {
            let base = if dir.is_empty() || dir == "." {
                self.root.clone()
            } else {
                self.root.join(dir)
            };
            let candidate = base.join(target);
            candidate
                .exists()
                .then(|| relative_slash_path(&self.root, &candidate))
        })
    }
}

fn is_directive(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

impl CodeScanner for LexicalScanner {
    fn extract_definitions(&self, file: &str, text: &str) -> Vec<FunctionDefinition> {
        let mut definitions: Vec<FunctionDefinition> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();

        for (idx, line) in text.split('\n').enumerate() {
            if is_directive(line) {
                continue;
            }
            let Some(caps) = self.definition.captures(line) else {
                continue;
            };
            let return_type = caps[1].trim().to_string();
            let name = caps[2].to_string();
            let parameters = caps[3].trim().to_string();

            let def = FunctionDefinition {
                signature: format!("{return_type} {name}({parameters})"),
                name: name.clone(),
                file_path: file.to_string(),
                line_number: idx + 1,
                return_type,
                parameters,
            };

            // a later definition of the same name in this file replaces the earlier one
            match by_name.get(&name) {
                Some(&pos) => definitions[pos] = def,
                None => {
                    by_name.insert(name, definitions.len());
                    definitions.push(def);
                }
            }
        }
        definitions
    }

    fn extract_calls(&self, file: &str, text: &str) -> Vec<FunctionCall> {
        let mut calls = Vec::new();
        let mut current: Option<String> = None;

        for (idx, line) in text.split('\n').enumerate() {
            // start offset of the declarator on a definition line
            let mut declarator = None;
            if !is_directive(line) {
                if let Some(caps) = self.definition.captures(line) {
                    if let Some(name) = caps.get(2) {
                        current = Some(name.as_str().to_string());
                        declarator = Some(name.start());
                    }
                } else if current.is_none() && self.prototype.is_match(line) {
                    continue;
                }
            }

            for caps in self.call.captures_iter(line) {
                let Some(name) = caps.get(1) else { continue };
                if Some(name.start()) == declarator || CALL_STOPLIST.contains(&name.as_str()) {
                    continue;
                }
                calls.push(FunctionCall {
                    caller_file: file.to_string(),
                    caller_function: current.clone(),
                    caller_line: idx + 1,
                    called_function: name.as_str().to_string(),
                    called_file: None,
                });
            }
        }
        calls
    }

    fn extract_includes(&self, text: &str) -> Vec<String> {
        let mut resolved: Vec<String> = Vec::new();
        for caps in self.include.captures_iter(text) {
            if let Some(path) = self.resolve_include(&caps[1]) {
                if !resolved.contains(&path) {
                    resolved.push(path);
                }
            }
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::fs;
    use tempfile::tempdir;

    fn scanner(root: &Path) -> LexicalScanner {
        let dirs: Vec<String> = [".", "include", "src"].iter().map(|s| s.to_string()).collect();
        LexicalScanner::new(root, &dirs).unwrap()
    }

    #[test]
    fn test_extract_definitions() {
        let s = scanner(Path::new("/nonexistent"));
        let text = "#include <stdio.h>\n\
                    static int* make_buf(size_t n, int fill) {\n\
                    \treturn 0;\n\
                    }\n\
                    #define WRAP(x) int x(void) {\n\
                    void run(void)\n\
                    {\n\
                    }\n";
        let defs = s.extract_definitions("buf.c", text);
        assert_eq!(defs.len(), 1);
        let d = &defs[0];
        assert_eq!(d.name, "make_buf");
        assert_eq!(d.line_number, 2);
        assert_eq!(d.return_type, "static int*");
        assert_eq!(d.parameters, "size_t n, int fill");
        assert_eq!(d.signature, "static int* make_buf(size_t n, int fill)");
        assert_eq!(d.file_path, "buf.c");
    }

    #[test]
    fn test_later_duplicate_definition_wins() {
        let s = scanner(Path::new("/nonexistent"));
        let text = "int f(void) {\n}\nint f(int x) {\n}\nint g() {\n}\n";
        let defs = s.extract_definitions("dup.c", text);
        let names: Vec<(&str, usize)> = defs.iter().map(|d| (d.name.as_str(), d.line_number)).collect();
        assert_eq!(names, vec![("f", 3), ("g", 5)]);
    }

    #[test]
    fn test_extract_calls_tracks_caller_and_stoplist() {
        let s = scanner(Path::new("/nonexistent"));
        let text = "int helper(int);\n\
                    int main(int argc, char **argv) {\n\
                    \tif (argc > 1) {\n\
                    \t\tprintf(\"%d\", helper(sizeof(int)));\n\
                    \t}\n\
                    \twhile (0) {}\n\
                    \treturn 0;\n\
                    }\n";
        let calls = s.extract_calls("main.c", text);
        let seen: Vec<(Option<&str>, usize, &str)> = calls
            .iter()
            .map(|c| (c.caller_function.as_deref(), c.caller_line, c.called_function.as_str()))
            .collect();
        assert_eq!(
            seen,
            vec![(Some("main"), 4, "printf"), (Some("main"), 4, "helper")]
        );
    }

    #[test]
    fn test_calls_outside_functions_have_no_caller() {
        let s = scanner(Path::new("/nonexistent"));
        let calls = s.extract_calls("init.c", "static int x = compute(3);\n");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].caller_function, None);
        assert_eq!(calls[0].called_function, "compute");
    }

    #[test]
    fn test_recursive_call_on_definition_line_is_kept() {
        let s = scanner(Path::new("/nonexistent"));
        let calls = s.extract_calls("r.c", "int fact(int n) { return n ? n * fact(n - 1) : 1; }\n");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].called_function, "fact");
        assert_eq!(calls[0].caller_function.as_deref(), Some("fact"));
    }

    #[test]
    fn test_include_resolution_order() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("include")).unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("include/api.h"), "").unwrap();
        fs::write(dir.path().join("src/api.h"), "").unwrap();
        fs::write(dir.path().join("local.h"), "").unwrap();

        let s = scanner(dir.path());
        let text = "#include \"local.h\"\n#include <api.h>\n#include <stdio.h>\n#include \"local.h\"\n";
        assert_eq!(s.extract_includes(text), vec!["local.h", "include/api.h"]);
    }
}
