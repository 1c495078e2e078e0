/// End-to-end tests for both pipelines.
///
///   source tree → Preprocessor → cache tree + reports
///   source tree → RelationAnalyzer → RelationStore → queries
use cproject_graph::config::{AnalysisConfig, PreprocessConfig};
use cproject_graph::db::RelationStore;
use cproject_graph::db::models::DependencyType;
use cproject_graph::indexer::RelationAnalyzer;
use cproject_graph::preprocess::Preprocessor;
use cproject_graph::preprocess::copier::create_cache_layout;
use cproject_graph::preprocess::stats::{JSON_REPORT_NAME, TEXT_REPORT_NAME};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const MAIN_C: &str = "#include <stdio.h>\n#include \"math.h\"\n\nint main(void) {\n    return add(1, 2);\n}\n";
const MATH_H: &str = "#ifndef MATH_H\n#define MATH_H\n\nint add(int a, int b);\n\n#endif\n";
const MATH_C: &str = "#include \"math.h\"\n\nint add(int a, int b) {\n    return a + b;\n}\n";

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn demo_project(root: &Path) {
    write(root, "main.c", MAIN_C.as_bytes());
    write(root, "math.h", MATH_H.as_bytes());
    write(root, "math.c", MATH_C.as_bytes());
}

fn test_config() -> PreprocessConfig {
    PreprocessConfig {
        min_disk_space: 0,
        show_progress: false,
        worker_count: 2,
        ..PreprocessConfig::default()
    }
}

/// main.c + math.c/math.h: preprocessing pairs math, analysis finds one call.
#[tokio::test]
async fn test_main_math_scenario() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    demo_project(src.path());
    let cache = out.path().join("cache");

    let outcome = Preprocessor::new(test_config())
        .unwrap()
        .preprocess(src.path(), &cache)
        .await;

    assert!(outcome.success, "errors: {:?}", outcome.stats.errors);
    assert_eq!(outcome.stats.total_files, 3);
    assert_eq!(outcome.stats.processed_pairs, 1);
    assert_eq!(outcome.stats.source_only, 1);
    assert!(outcome.stats.is_partition_consistent());

    assert_eq!(
        fs::read_to_string(cache.join("paired_files/math/math.c")).unwrap(),
        MATH_C
    );
    assert_eq!(
        fs::read_to_string(cache.join("paired_files/math/math.h")).unwrap(),
        MATH_H
    );
    assert_eq!(
        fs::read_to_string(cache.join("individual_files/source_only/main/main.c")).unwrap(),
        MAIN_C
    );
    assert!(cache.join(JSON_REPORT_NAME).is_file());
    assert!(cache.join(TEXT_REPORT_NAME).is_file());

    let mut store = RelationStore::open_in_memory().unwrap();
    let analyzer = RelationAnalyzer::new(src.path(), AnalysisConfig::default()).unwrap();
    let summary = analyzer.analyze_and_save(&mut store, "demo").unwrap();
    assert_eq!(summary.definitions, 2);
    assert_eq!(summary.calls, 1);

    let defs = store.search_function_usage("demo", "");
    let mut names: Vec<&str> = defs.definitions.iter().map(|d| d.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["add", "main"]);

    let call = &defs.calls[0];
    assert_eq!(call.caller_function.as_deref(), Some("main"));
    assert_eq!(call.called_function, "add");
    assert_eq!(call.called_file.as_deref(), Some("math.c"));
    assert_eq!(call.caller_line, 5);

    let deps = store.get_file_dependencies("demo", None);
    let edges: Vec<(&str, &str, DependencyType)> = deps
        .edges
        .iter()
        .map(|e| (e.source_file.as_str(), e.target_file.as_str(), e.dependency_type))
        .collect();
    assert_eq!(
        edges,
        vec![
            ("main.c", "math.c", DependencyType::Call),
            ("main.c", "math.h", DependencyType::Include),
            ("math.c", "math.h", DependencyType::Include),
        ]
    );
}

#[tokio::test]
async fn test_large_file_copied_through_chunked_path() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();

    // threshold and chunk size scaled down; the file spans several chunks
    let size = 5 * 1024 * 1024 / 2;
    let data: Vec<u8> = (0..size).map(|i| (i % 253) as u8).collect();
    write(src.path(), "assets/blob.bin", &data);
    write(src.path(), "assets/small.txt", b"tiny");

    let config = PreprocessConfig {
        large_file_threshold: 1024 * 1024,
        chunk_size: 64 * 1024,
        ..test_config()
    };
    let outcome = Preprocessor::new(config)
        .unwrap()
        .preprocess(src.path(), out.path())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.stats.misc_files, 2);
    assert_eq!(outcome.stats.total_size, size as u64 + 4);
    let copied = fs::read(out.path().join("individual_files/misc_files/blob/blob.bin")).unwrap();
    assert_eq!(copied.len(), data.len());
    assert!(copied == data);
}

#[tokio::test]
async fn test_insufficient_disk_space_fails_cleanly() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    demo_project(src.path());
    let cache = out.path().join("cache");

    let config = PreprocessConfig {
        min_disk_space: u64::MAX,
        ..test_config()
    };
    let outcome = Preprocessor::new(config)
        .unwrap()
        .preprocess(src.path(), &cache)
        .await;

    assert!(!outcome.success);
    assert!(!outcome.stats.errors.is_empty());
    assert!(outcome.stats.errors[0].contains("disk full"));
    assert!(!cache.join("paired_files").exists());
    assert!(!cache.join(JSON_REPORT_NAME).exists());
    assert!(!cache.join(TEXT_REPORT_NAME).exists());
}

/// Running out of space mid-copy aborts the run and leaves no reports.
#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_disk_full_during_copy_aborts_run() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    demo_project(src.path());
    for i in 0..30 {
        write(src.path(), &format!("docs/note{i}.txt"), b"note");
    }
    let cache = out.path().join("cache");
    fs::create_dir_all(cache.join("paired_files/math")).unwrap();
    std::os::unix::fs::symlink("/dev/full", cache.join("paired_files/math/math.c")).unwrap();

    let config = PreprocessConfig {
        worker_count: 1,
        ..test_config()
    };
    let outcome = Preprocessor::new(config)
        .unwrap()
        .preprocess(src.path(), &cache)
        .await;

    assert!(!outcome.success);
    assert!(
        outcome.stats.errors.iter().any(|e| e.contains("disk full")),
        "errors: {:?}",
        outcome.stats.errors
    );
    assert!(!cache.join(JSON_REPORT_NAME).exists());
    assert!(!cache.join(TEXT_REPORT_NAME).exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinked_header_still_pairs() {
    let outside = tempdir().unwrap();
    write(outside.path(), "real_util.h", b"int util(void);\n");
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    write(src.path(), "util.c", b"int util(void) {\n  return 0;\n}\n");
    std::os::unix::fs::symlink(outside.path().join("real_util.h"), src.path().join("util.h")).unwrap();

    let outcome = Preprocessor::new(test_config())
        .unwrap()
        .preprocess(src.path(), out.path())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.stats.total_files, 2);
    assert_eq!(outcome.stats.processed_pairs, 1);
    assert_eq!(outcome.stats.source_only, 0);
    assert_eq!(
        fs::read_to_string(out.path().join("paired_files/util/util.h")).unwrap(),
        "int util(void);\n"
    );
}

#[tokio::test]
async fn test_every_scanned_file_lands_in_exactly_one_bucket() {
    let src = tempdir().unwrap();
    let out = tempdir().unwrap();
    for rel in [
        "src/net_impl.c",
        "include/net.h",
        "util/str.c",
        "util/str.h",
        "util/log.c",
        "include/config.hpp",
        "docs/README.md",
        "Makefile",
        "build/app.o",
        "notes.bak",
    ] {
        write(src.path(), rel, rel.as_bytes());
    }

    let outcome = Preprocessor::new(test_config())
        .unwrap()
        .preprocess(src.path(), out.path())
        .await;
    let stats = outcome.stats;

    assert!(outcome.success);
    // *.o and *.bak are excluded before counting
    assert_eq!(stats.total_files, 8);
    assert_eq!(stats.processed_pairs, 2);
    assert_eq!(stats.header_only, 1);
    assert_eq!(stats.source_only, 1);
    assert_eq!(stats.misc_files, 2);
    assert!(stats.is_partition_consistent());

    assert!(out.path().join("paired_files/net_impl/net.h").is_file());
    assert!(out.path().join("paired_files/str/str.c").is_file());
    assert!(out.path().join("individual_files/header_only/config/config.hpp").is_file());
    assert!(out.path().join("individual_files/misc_files/Makefile/Makefile").is_file());
}

#[test]
fn test_cache_layout_idempotent_and_preserving() {
    let dir = tempdir().unwrap();
    create_cache_layout(dir.path()).unwrap();
    write(dir.path(), "paired_files/x/x.c", b"int x;");
    create_cache_layout(dir.path()).unwrap();
    assert_eq!(fs::read(dir.path().join("paired_files/x/x.c")).unwrap(), b"int x;");
}

#[test]
fn test_saved_counts_and_rankings() {
    let src = tempdir().unwrap();
    write(
        src.path(),
        "core.c",
        b"int step(int x) {\n  return x + 1;\n}\n\nint twice(int x) {\n  return step(step(x));\n}\n",
    );
    write(
        src.path(),
        "app.c",
        b"int run(void) {\n  int a = step(1);\n  int b = twice(a);\n  return step(b);\n}\n",
    );

    let mut store = RelationStore::open_in_memory().unwrap();
    let analyzer = RelationAnalyzer::new(src.path(), AnalysisConfig::default()).unwrap();
    let result = analyzer.analyze().unwrap();
    let n = result.definitions.len();
    let m = result.calls.len();
    store.save(&result, "ranked").unwrap();

    let stats = store.get_project_statistics("ranked");
    assert_eq!(stats.function_definitions, n);
    assert_eq!(stats.function_calls, m);
    assert_eq!((n, m), (3, 5));
    assert_eq!(stats.unique_files, 2);

    let called = store.get_most_called_functions("ranked", 10);
    assert_eq!(called[0].function, "step");
    assert_eq!(called[0].call_count, 4);
    assert!(called.windows(2).all(|w| w[0].call_count >= w[1].call_count));

    let complex = store.get_most_complex_functions("ranked", 10);
    assert_eq!(complex[0].function, "run");
    assert_eq!(complex[0].calls_made, 2);

    let chain = store.get_function_call_chain("ranked", "run", 3);
    let twice = chain.call_tree.iter().find(|n| n.function == "twice").unwrap();
    assert_eq!(twice.children.len(), 2);
    assert!(twice.children.iter().all(|c| c.function == "step" && c.depth == 2));
}
