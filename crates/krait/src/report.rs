//! Rendered discovery output.
//!
//! A report is a single JSON object mapping each queried module name to
//! either a sorted list of third-party root names (plain mode) or a nested
//! object with `type` / `optional` / `stack` annotations. Map keys are
//! emitted in lexical order so reruns are byte-identical.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::extractor::ImportSite;
use crate::tracker::{TrackOptions, TrackedModules};

pub const TYPE_DIRECT: &str = "direct";
pub const TYPE_TRANSITIVE: &str = "transitive";

/// Per-dependency annotations; only the requested fields are emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepAnnotation {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub dep_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    /// Witness stacks: one frame per traversed import site
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<Vec<ImportSite>>>,
}

/// One queried module's rendered result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleEntry {
    /// Sorted third-party root names (no annotation flags set)
    Plain(Vec<String>),
    /// Root name to annotations (any annotation flag set)
    Annotated(BTreeMap<String, DepAnnotation>),
    /// Typed error entry for a failed subprocess sub-job
    Failed { error: String },
}

/// The full report, keyed by queried module name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackReport(pub BTreeMap<String, ModuleEntry>);

impl TrackReport {
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }
}

/// Render raw closures according to the output flags.
pub fn render_report(tracked: &TrackedModules, opts: &TrackOptions) -> TrackReport {
    let annotated = opts.detect_transitive || opts.track_import_stack || opts.show_optional;
    let mut report = TrackReport::default();

    for (module, closure) in &tracked.closures {
        let entry = if annotated {
            let mut deps = BTreeMap::new();
            for (dep_name, info) in &closure.deps {
                let mut annotation = DepAnnotation::default();
                if opts.detect_transitive {
                    annotation.dep_type = Some(
                        if info.direct {
                            TYPE_DIRECT
                        } else {
                            TYPE_TRANSITIVE
                        }
                        .to_owned(),
                    );
                }
                if opts.show_optional {
                    annotation.optional = Some(info.optional);
                }
                if opts.track_import_stack {
                    annotation.stack = Some(
                        info.witnesses
                            .iter()
                            .map(|witness| witness.frames.clone())
                            .collect(),
                    );
                }
                deps.insert(dep_name.clone(), annotation);
            }
            ModuleEntry::Annotated(deps)
        } else {
            ModuleEntry::Plain(
                closure
                    .dep_names()
                    .into_iter()
                    .map(str::to_owned)
                    .collect(),
            )
        };
        report.0.insert(module.clone(), entry);
    }

    report
}

/// Serialize a report, optionally pretty-printed with the given indent width.
pub fn report_to_json(report: &TrackReport, indent: Option<usize>) -> Result<String> {
    let json = match indent {
        None => serde_json::to_string(report)?,
        Some(width) => {
            let indent_str = " ".repeat(width);
            let mut buf = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent_str.as_bytes());
            let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
            report.serialize(&mut serializer)?;
            String::from_utf8(buf)?
        }
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{Closure, DepInfo, Witness};

    fn tracked_fixture() -> TrackedModules {
        let mut closure = Closure::default();
        closure.deps.insert(
            "alog".to_owned(),
            DepInfo {
                direct: true,
                optional: false,
                witnesses: vec![Witness {
                    modules: vec!["lib.mod".to_owned()],
                    frames: vec![ImportSite {
                        filename: "lib/mod.py".to_owned(),
                        lineno: 3,
                        code_context: "import alog".to_owned(),
                    }],
                    optional: false,
                }],
            },
        );
        let mut closures = BTreeMap::new();
        closures.insert("lib.mod".to_owned(), closure);
        TrackedModules {
            target: "lib.mod".to_owned(),
            closures,
        }
    }

    #[test]
    fn test_plain_report() {
        let tracked = tracked_fixture();
        let report = render_report(&tracked, &TrackOptions::new("lib.mod"));
        let json = report_to_json(&report, None).unwrap();
        assert_eq!(json, r#"{"lib.mod":["alog"]}"#);
    }

    #[test]
    fn test_annotated_report() {
        let tracked = tracked_fixture();
        let mut opts = TrackOptions::new("lib.mod");
        opts.detect_transitive = true;
        opts.show_optional = true;
        let report = render_report(&tracked, &opts);
        let json = report_to_json(&report, None).unwrap();
        assert_eq!(
            json,
            r#"{"lib.mod":{"alog":{"type":"direct","optional":false}}}"#
        );
    }

    #[test]
    fn test_stack_frames_roundtrip() {
        let tracked = tracked_fixture();
        let mut opts = TrackOptions::new("lib.mod");
        opts.track_import_stack = true;
        let report = render_report(&tracked, &opts);
        let json = report_to_json(&report, Some(2)).unwrap();
        assert!(json.contains("\"lineno\": 3"));

        let reparsed: TrackReport = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed, report);
    }

    #[test]
    fn test_failed_entry_roundtrip() {
        let mut report = TrackReport::default();
        report.0.insert(
            "lib.bad".to_owned(),
            ModuleEntry::Failed {
                error: "subprocess exited with status 1".to_owned(),
            },
        );
        let json = report_to_json(&report, None).unwrap();
        let reparsed: TrackReport = serde_json::from_str(&json).unwrap();
        assert_eq!(reparsed, report);
    }
}
