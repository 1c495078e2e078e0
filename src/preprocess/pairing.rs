//! Ordered source → header pairing rules.

use std::collections::{BTreeMap, HashMap, HashSet};

use regex::Regex;
use tracing::{debug, info};

use super::classifier::FileRecord;
use crate::config::{PairingRuleConfig, PreprocessConfig};
use crate::error::PreprocessError;

/// A compiled pairing rule.
///
/// The source pattern must match at the start of the source file's relative
/// path; the header template is then substituted for every match of the
/// pattern, so `(.*)\.c → ${1}.h` maps `net/sock.cpp` to `net/sock.hpp`.
#[derive(Debug, Clone)]
pub struct PairingRule {
    anchored: Regex,
    pattern: Regex,
    header_template: String,
}

impl PairingRule {
    pub fn new(source_pattern: &str, header_template: &str) -> Result<Self, PreprocessError> {
        let invalid = |e: regex::Error| {
            PreprocessError::Config(format!("invalid pairing pattern {source_pattern:?}: {e}"))
        };
        let pattern = Regex::new(source_pattern).map_err(invalid)?;
        let anchored = Regex::new(&format!("^(?:{source_pattern})")).map_err(invalid)?;

        let groups = pattern.captures_len() - 1;
        let max_ref = max_group_reference(header_template).map_err(|bad| {
            PreprocessError::Config(format!(
                "header pattern {header_template:?} has ambiguous reference {bad:?}; write ${{n}} when text follows a group number"
            ))
        })?;
        if let Some(max_ref) = max_ref {
            if max_ref > groups {
                return Err(PreprocessError::Config(format!(
                    "header pattern {header_template:?} references group {max_ref} but {source_pattern:?} has {groups}"
                )));
            }
        }

        Ok(Self {
            anchored,
            pattern,
            header_template: header_template.to_string(),
        })
    }

    pub fn from_config(rule: &PairingRuleConfig) -> Result<Self, PreprocessError> {
        Self::new(&rule.source_pattern, &rule.header_pattern)
    }

    /// Compile every configured rule, failing on the first bad one.
    pub fn compile_all(rules: &[PairingRuleConfig]) -> Result<Vec<Self>, PreprocessError> {
        rules.iter().map(Self::from_config).collect()
    }

    /// Expected header path for `source_relative`, if the rule applies.
    #[must_use]
    pub fn expected_header(&self, source_relative: &str) -> Option<String> {
        if !self.anchored.is_match(source_relative) {
            return None;
        }
        Some(
            self.pattern
                .replace_all(source_relative, self.header_template.as_str())
                .into_owned(),
        )
    }
}

/// Highest numbered group referenced by `template`.
///
/// An unbraced number followed by a word character (`$1_impl`) is returned
/// as an error: the regex crate reads it as a group name that can never
/// exist and expands it to nothing.
fn max_group_reference(template: &str) -> Result<Option<usize>, String> {
    let bytes = template.as_bytes();
    let mut max = None;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'$') {
            i += 2;
            continue;
        }
        let braced = bytes.get(i + 1) == Some(&b'{');
        let start = if braced { i + 2 } else { i + 1 };
        let digits: String = template[start..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        let end = start + digits.len();
        if !braced
            && !digits.is_empty()
            && bytes
                .get(end)
                .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'_')
        {
            let tail: String = template[end..]
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            return Err(format!("${digits}{tail}"));
        }
        if let Ok(n) = digits.parse::<usize>() {
            max = Some(max.map_or(n, |m: usize| m.max(n)));
        }
        i = end.max(start + 1);
    }
    Ok(max)
}

/// A source file and the header it was paired with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePair {
    pub base_name: String,
    pub source: FileRecord,
    pub header: FileRecord,
}

/// Apply `rules` in order to every source file and return the pairs keyed
/// by unique base name.
///
/// For each source the first rule whose expected header exists wins. The
/// header is looked up by relative path first, then by file name alone. A
/// header joins at most one pair. Stem collisions get a `_N` suffix.
pub fn find_pairs(
    files: &[FileRecord],
    rules: &[PairingRule],
    config: &PreprocessConfig,
) -> BTreeMap<String, FilePair> {
    let mut sources: Vec<&FileRecord> = files
        .iter()
        .filter(|f| config.is_source_extension(&f.extension()))
        .collect();
    let mut headers: Vec<&FileRecord> = files
        .iter()
        .filter(|f| config.is_header_extension(&f.extension()))
        .collect();
    sources.sort_by(|a, b| a.relative.cmp(&b.relative));
    headers.sort_by(|a, b| a.relative.cmp(&b.relative));

    info!(
        "Found {} source files and {} header files",
        sources.len(),
        headers.len()
    );

    let by_relative: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.relative.as_str(), i))
        .collect();
    let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, h) in headers.iter().enumerate() {
        by_name.entry(h.file_name()).or_default().push(i);
    }

    let mut claimed: HashSet<usize> = HashSet::new();
    let mut pairs = BTreeMap::new();

    for source in sources {
        for rule in rules {
            let Some(expected) = rule.expected_header(&source.relative) else {
                continue;
            };

            let exact = by_relative
                .get(expected.as_str())
                .copied()
                .filter(|i| !claimed.contains(i));
            let found = exact.or_else(|| {
                let name = expected.rsplit('/').next().unwrap_or(expected.as_str());
                by_name
                    .get(name)
                    .and_then(|idxs| idxs.iter().copied().find(|i| !claimed.contains(i)))
            });

            if let Some(idx) = found {
                claimed.insert(idx);
                let header = headers[idx];
                let base_name = unique_base_name(&source.stem(), &pairs);
                debug!("Paired {} <-> {}", source.relative, header.relative);
                pairs.insert(
                    base_name.clone(),
                    FilePair {
                        base_name,
                        source: source.clone(),
                        header: header.clone(),
                    },
                );
                break;
            }
        }
    }

    info!("Found {} file pairs", pairs.len());
    pairs
}

fn unique_base_name(stem: &str, existing: &BTreeMap<String, FilePair>) -> String {
    if !existing.contains_key(stem) {
        return stem.to_string();
    }
    let mut counter = 1;
    loop {
        let candidate = format!("{stem}_{counter}");
        if !existing.contains_key(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Files that did not end up in any pair, in input order.
pub fn unpaired_files(files: Vec<FileRecord>, pairs: &BTreeMap<String, FilePair>) -> Vec<FileRecord> {
    let paired: HashSet<&str> = pairs
        .values()
        .flat_map(|p| [p.source.relative.as_str(), p.header.relative.as_str()])
        .collect();
    files
        .into_iter()
        .filter(|f| !paired.contains(f.relative.as_str()))
        .collect()
}
