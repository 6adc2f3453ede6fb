//! Structural diffs between resource snapshots.
//!
//! Both sides are serialized to a `serde_json::Value` tree and compared
//! field by field. The result is an edit script in JSON Patch (RFC 6902)
//! form with RFC 6901 pointer paths. Diffs exist for logging only.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Paths excluded from diffs unless configured otherwise.
///
/// `resourceVersion` changes on every write and `managedFields` is
/// server-side bookkeeping; neither says anything about what changed.
pub const DEFAULT_IGNORED_PATHS: &[&str] = &["/metadata/managedFields", "/metadata/resourceVersion"];

/// One step of an edit script.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    /// Field or element present only in the current snapshot
    Add {
        /// JSON pointer
        path: String,
        /// New value
        value: Value,
    },
    /// Field or element present only in the prior snapshot
    Remove {
        /// JSON pointer
        path: String,
        /// Removed value
        #[serde(skip)]
        previous: Value,
    },
    /// Value changed in place
    Replace {
        /// JSON pointer
        path: String,
        /// Old value
        #[serde(skip)]
        previous: Value,
        /// New value
        value: Value,
    },
}

impl PatchOperation {
    /// JSON pointer the operation applies to.
    pub fn path(&self) -> &str {
        match self {
            PatchOperation::Add { path, .. }
            | PatchOperation::Remove { path, .. }
            | PatchOperation::Replace { path, .. } => path,
        }
    }
}

/// Outcome of diffing a `Modified` event.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffReport {
    /// No prior snapshot was cached, nothing to diff against.
    PriorUnknown,
    /// A snapshot could not be serialized.
    Unavailable(String),
    /// Edit script from prior to current; empty when structurally identical.
    Changes(Vec<PatchOperation>),
}

impl DiffReport {
    /// Operations of the edit script, empty unless `Changes`.
    pub fn operations(&self) -> &[PatchOperation] {
        match self {
            DiffReport::Changes(ops) => ops,
            _ => &[],
        }
    }

    /// Whether a diff was computed and found no differences.
    pub fn is_unchanged(&self) -> bool {
        matches!(self, DiffReport::Changes(ops) if ops.is_empty())
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffReport::PriorUnknown => f.write_str("(prior unknown)"),
            DiffReport::Unavailable(reason) => write!(f, "(diff unavailable: {reason})"),
            DiffReport::Changes(ops) if ops.is_empty() => f.write_str("(no changes)"),
            DiffReport::Changes(ops) => f.write_str(&render_patch(ops)),
        }
    }
}

/// Renders an edit script as a JSON Patch document.
pub fn render_patch(ops: &[PatchOperation]) -> String {
    serde_json::to_string(ops).unwrap_or_else(|e| format!("<unrenderable patch: {e}>"))
}

/// Computes diff reports, skipping ignored path prefixes.
#[derive(Debug, Clone)]
pub struct DiffReporter {
    ignored: Vec<String>,
}

impl Default for DiffReporter {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORED_PATHS.iter().map(|p| (*p).to_string()))
    }
}

impl DiffReporter {
    /// Creates a reporter ignoring the given JSON pointer prefixes.
    pub fn new(ignored: impl IntoIterator<Item = String>) -> Self {
        Self {
            ignored: ignored.into_iter().filter(|p| !p.is_empty()).collect(),
        }
    }

    /// Ignored JSON pointer prefixes.
    pub fn ignored_paths(&self) -> &[String] {
        &self.ignored
    }

    /// Diffs `prior` against `current`.
    ///
    /// Returns `PriorUnknown` when there is no prior; never diffs against an
    /// empty document.
    pub fn report<K: Serialize>(&self, prior: Option<&K>, current: &K) -> DiffReport {
        let Some(prior) = prior else {
            return DiffReport::PriorUnknown;
        };

        let (prior, current) = match (serde_json::to_value(prior), serde_json::to_value(current)) {
            (Ok(prior), Ok(current)) => (prior, current),
            (Err(e), _) | (_, Err(e)) => return DiffReport::Unavailable(e.to_string()),
        };

        DiffReport::Changes(self.diff_values(&prior, &current))
    }

    /// Diffs two JSON trees, dropping operations under ignored prefixes.
    pub fn diff_values(&self, prior: &Value, current: &Value) -> Vec<PatchOperation> {
        let mut ops = Vec::new();
        self.walk("", prior, current, &mut ops);
        ops
    }

    fn is_ignored(&self, path: &str) -> bool {
        self.ignored.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    fn walk(&self, path: &str, prior: &Value, current: &Value, ops: &mut Vec<PatchOperation>) {
        if self.is_ignored(path) {
            return;
        }

        match (prior, current) {
            (Value::Object(before), Value::Object(after)) => {
                let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
                for key in keys {
                    let child = format!("{path}/{}", escape_pointer_token(key));
                    match (before.get(key), after.get(key)) {
                        (Some(b), Some(a)) => self.walk(&child, b, a, ops),
                        (Some(b), None) => self.push(
                            PatchOperation::Remove {
                                path: child,
                                previous: b.clone(),
                            },
                            ops,
                        ),
                        (None, Some(a)) => self.push(
                            PatchOperation::Add {
                                path: child,
                                value: a.clone(),
                            },
                            ops,
                        ),
                        (None, None) => {}
                    }
                }
            }
            (Value::Array(before), Value::Array(after)) => {
                let common = before.len().min(after.len());
                for (index, (b, a)) in before.iter().zip(after.iter()).enumerate() {
                    self.walk(&format!("{path}/{index}"), b, a, ops);
                }
                for (index, a) in after.iter().enumerate().skip(common) {
                    self.push(
                        PatchOperation::Add {
                            path: format!("{path}/{index}"),
                            value: a.clone(),
                        },
                        ops,
                    );
                }
                // Highest index first so the script applies in order
                for index in (common..before.len()).rev() {
                    self.push(
                        PatchOperation::Remove {
                            path: format!("{path}/{index}"),
                            previous: before[index].clone(),
                        },
                        ops,
                    );
                }
            }
            (b, a) if b == a => {}
            (b, a) => self.push(
                PatchOperation::Replace {
                    path: path.to_string(),
                    previous: b.clone(),
                    value: a.clone(),
                },
                ops,
            ),
        }
    }

    fn push(&self, op: PatchOperation, ops: &mut Vec<PatchOperation>) {
        if !self.is_ignored(op.path()) {
            ops.push(op);
        }
    }
}

/// Escapes a key for use as a JSON pointer reference token.
pub fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(ops: &[PatchOperation]) -> Vec<&str> {
        ops.iter().map(PatchOperation::path).collect()
    }

    #[test]
    fn test_identical_documents_have_empty_diff() {
        let doc = json!({"metadata": {"name": "cfg1"}, "data": {"k": "v1"}});
        let report = DiffReporter::default().report(Some(&doc), &doc);
        assert!(report.is_unchanged());
        assert_eq!(report.to_string(), "(no changes)");
    }

    #[test]
    fn test_missing_prior_is_reported_not_diffed() {
        let doc = json!({"data": {"k": "v1"}});
        let report = DiffReporter::default().report(None, &doc);
        assert_eq!(report, DiffReport::PriorUnknown);
        assert!(report.operations().is_empty());
    }

    #[test]
    fn test_single_field_change_yields_exact_path() {
        let prior = json!({"metadata": {"name": "cfg1"}, "data": {"k": "v1", "other": "same"}});
        let current = json!({"metadata": {"name": "cfg1"}, "data": {"k": "v2", "other": "same"}});
        let ops = DiffReporter::default().diff_values(&prior, &current);
        assert_eq!(
            ops,
            vec![PatchOperation::Replace {
                path: "/data/k".to_string(),
                previous: json!("v1"),
                value: json!("v2"),
            }]
        );
    }

    #[test]
    fn test_added_and_removed_keys() {
        let prior = json!({"data": {"gone": "x", "kept": "y"}});
        let current = json!({"data": {"kept": "y", "new": "z"}});
        let ops = DiffReporter::default().diff_values(&prior, &current);
        assert_eq!(paths(&ops), vec!["/data/gone", "/data/new"]);
        assert!(matches!(ops[0], PatchOperation::Remove { .. }));
        assert!(matches!(ops[1], PatchOperation::Add { .. }));
    }

    #[test]
    fn test_array_growth_and_shrink() {
        let reporter = DiffReporter::default();

        let grown = reporter.diff_values(&json!({"a": [1, 2]}), &json!({"a": [1, 3, 4, 5]}));
        assert_eq!(paths(&grown), vec!["/a/1", "/a/2", "/a/3"]);

        let shrunk = reporter.diff_values(&json!({"a": [1, 2, 3, 4]}), &json!({"a": [1]}));
        assert_eq!(paths(&shrunk), vec!["/a/3", "/a/2", "/a/1"]);
        assert!(shrunk.iter().all(|op| matches!(op, PatchOperation::Remove { .. })));
    }

    #[test]
    fn test_type_change_is_replace() {
        let ops = DiffReporter::default().diff_values(&json!({"a": {"b": 1}}), &json!({"a": "flat"}));
        assert_eq!(paths(&ops), vec!["/a"]);
        assert!(matches!(ops[0], PatchOperation::Replace { .. }));
    }

    #[test]
    fn test_pointer_escaping() {
        let ops = DiffReporter::default().diff_values(
            &json!({"data": {"app/config~1": "a"}}),
            &json!({"data": {"app/config~1": "b"}}),
        );
        assert_eq!(paths(&ops), vec!["/data/app~1config~01"]);
    }

    #[test]
    fn test_default_ignores_resource_version_and_managed_fields() {
        let prior = json!({"metadata": {"resourceVersion": "1", "managedFields": [{"manager": "a"}]}});
        let current = json!({"metadata": {"resourceVersion": "2", "managedFields": [{"manager": "b"}]}});
        assert!(DiffReporter::default().diff_values(&prior, &current).is_empty());
        assert_eq!(DiffReporter::new(Vec::new()).diff_values(&prior, &current).len(), 2);
    }

    #[test]
    fn test_ignored_prefix_matches_whole_segments() {
        let reporter = DiffReporter::new(vec!["/metadata/label".to_string()]);
        let ops = reporter.diff_values(
            &json!({"metadata": {"labels": {"a": "1"}}}),
            &json!({"metadata": {"labels": {"a": "2"}}}),
        );
        assert_eq!(paths(&ops), vec!["/metadata/labels/a"]);
    }

    #[test]
    fn test_render_as_json_patch() {
        let ops = vec![
            PatchOperation::Replace {
                path: "/data/k".to_string(),
                previous: json!("v1"),
                value: json!("v2"),
            },
            PatchOperation::Remove {
                path: "/data/old".to_string(),
                previous: json!("x"),
            },
        ];
        assert_eq!(
            render_patch(&ops),
            r#"[{"op":"replace","path":"/data/k","value":"v2"},{"op":"remove","path":"/data/old"}]"#
        );
    }
}
