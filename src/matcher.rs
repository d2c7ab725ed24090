/// Template-based classification of log records (spec.md §4.2).
///
/// Each template compiles once into an anchored, literal-escaped regex with
/// `<*>` replaced by `([^ ]+)`; the compiled pattern is a *prefix* match, not
/// a full match, so trailing garbage after a known template still counts.
/// Templates are matched in catalog order, first match wins, which is what
/// keeps prior matches stable as new templates are appended (spec.md §8,
/// property 1).
use std::sync::Arc;

use arc_swap::ArcSwap;
use im::HashMap as ImHashMap;
use regex::Regex;

use crate::models::{EventTemplate, LogRecord};

#[derive(Clone)]
struct CompiledTemplate {
    template: EventTemplate,
    pattern: Regex,
}

/// Escape every character of `template` as a literal, then un-escape the
/// `<*>` placeholder into a one-or-more-non-space capture, anchored at the
/// start of the string.
fn compile_pattern(template: &str) -> Regex {
    let escaped = regex::escape(template);
    let escaped_wildcard = regex::escape("<*>");
    let body = escaped.replace(&escaped_wildcard, r"([^ ]+)");
    Regex::new(&format!("^{body}")).expect("matcher pattern must compile")
}

/// Append-only, append-in-order snapshot of the template catalog. Cloning a
/// snapshot is O(1) thanks to structural sharing (`im::Vector`/`ArcSwap`),
/// which is what lets the Scheduler hand a fresh snapshot to the Matcher at
/// the start of every tick without copying the whole catalog.
#[derive(Clone)]
struct Catalog {
    // Order matters: first-match-wins iterates this in insertion order.
    ordered: im::Vector<Arc<CompiledTemplate>>,
    by_event_id: ImHashMap<String, Arc<CompiledTemplate>>,
}

impl Catalog {
    fn empty() -> Self {
        Self {
            ordered: im::Vector::new(),
            by_event_id: ImHashMap::new(),
        }
    }

    fn push(&mut self, template: EventTemplate) {
        let compiled = Arc::new(CompiledTemplate {
            pattern: compile_pattern(&template.template),
            template: template.clone(),
        });
        self.ordered.push_back(compiled.clone());
        self.by_event_id.insert(template.event_id, compiled);
    }
}

/// Thread-safe, append-only template matcher.
pub struct Matcher {
    catalog: ArcSwap<Catalog>,
}

impl Matcher {
    pub fn new() -> Self {
        Self {
            catalog: ArcSwap::new(Arc::new(Catalog::empty())),
        }
    }

    pub fn with_templates(templates: Vec<EventTemplate>) -> Self {
        let matcher = Self::new();
        matcher.extend(templates);
        matcher
    }

    /// Append new templates to the end of the catalog. Never reorders or
    /// replaces existing entries, per spec.md §4.2's determinism note.
    pub fn extend(&self, new_templates: Vec<EventTemplate>) {
        if new_templates.is_empty() {
            return;
        }
        self.catalog.rcu(|old| {
            let mut next = (**old).clone();
            for t in new_templates.clone() {
                next.push(t);
            }
            Arc::new(next)
        });
    }

    pub fn catalog_snapshot(&self) -> Vec<EventTemplate> {
        self.catalog
            .load()
            .ordered
            .iter()
            .map(|c| c.template.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.catalog.load().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classify a batch of records in place. Returns the indices of records
    /// that matched no template — the "unknown set" fed to the Clusterer.
    pub fn classify(&self, logs: &mut [LogRecord]) -> Vec<usize> {
        let catalog = self.catalog.load();
        let mut unknown = Vec::new();

        for (i, log) in logs.iter_mut().enumerate() {
            let mut matched = false;
            for compiled in catalog.ordered.iter() {
                if compiled.pattern.is_match(&log.content) {
                    log.mark_matched(&compiled.template.event_id, compiled.template.is_abnormal);
                    matched = true;
                    break;
                }
            }
            if !matched {
                log.mark_unknown();
                unknown.push(i);
            }
        }

        unknown
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn log(content: &str) -> LogRecord {
        LogRecord {
            id: "1".to_string(),
            timestamp: Utc::now(),
            level: "INFO".to_string(),
            component: "svc".to_string(),
            content: content.to_string(),
            application: None,
            source_file: None,
            raw_log: None,
            event_id: None,
            is_anomaly: false,
            detection_timestamp: None,
            llm_analysis: None,
        }
    }

    // Scenario A: exact match against a non-abnormal template.
    #[test]
    fn exact_match_is_not_anomaly() {
        let matcher = Matcher::with_templates(vec![EventTemplate::new(
            "E1",
            "user <*> logged in",
        )]);
        let mut logs = vec![log("user alice logged in")];
        let unknown = matcher.classify(&mut logs);
        assert!(unknown.is_empty());
        assert_eq!(logs[0].event_id.as_deref(), Some("E1"));
        assert!(!logs[0].is_anomaly);
    }

    // Scenario B: match against an abnormal template.
    #[test]
    fn abnormal_match_is_anomaly() {
        let matcher =
            Matcher::with_templates(vec![EventTemplate::new("E42", "disk <*> failed")]);
        let mut logs = vec![log("disk sda failed")];
        let unknown = matcher.classify(&mut logs);
        assert!(unknown.is_empty());
        assert_eq!(logs[0].event_id.as_deref(), Some("E42"));
        assert!(logs[0].is_anomaly);
    }

    // Scenario C: no templates at all, log stays unknown.
    #[test]
    fn unmatched_log_is_anomaly_without_event_id() {
        let matcher = Matcher::new();
        let mut logs = vec![log("strange new event 42")];
        let unknown = matcher.classify(&mut logs);
        assert_eq!(unknown, vec![0]);
        assert!(logs[0].is_anomaly);
        assert!(logs[0].event_id.is_none());
    }

    #[test]
    fn prefix_match_ignores_trailing_garbage() {
        let matcher = Matcher::with_templates(vec![EventTemplate::new("E1", "boot complete")]);
        let mut logs = vec![log("boot complete -- extra unrelated suffix")];
        matcher.classify(&mut logs);
        assert_eq!(logs[0].event_id.as_deref(), Some("E1"));
    }

    #[test]
    fn first_match_wins_in_catalog_order() {
        let matcher = Matcher::with_templates(vec![
            EventTemplate::new("E1", "error <*>"),
            EventTemplate::new("E2", "error connection refused"),
        ]);
        let mut logs = vec![log("error connection refused")];
        matcher.classify(&mut logs);
        assert_eq!(logs[0].event_id.as_deref(), Some("E1"));
    }

    #[test]
    fn appending_templates_does_not_change_prior_matches() {
        let matcher = Matcher::with_templates(vec![EventTemplate::new("E1", "user <*> logged in")]);
        let mut before = vec![log("user alice logged in")];
        matcher.classify(&mut before);

        matcher.extend(vec![EventTemplate::new("E2", "user <*> logged out")]);

        let mut after = vec![log("user alice logged in")];
        matcher.classify(&mut after);

        assert_eq!(before[0].event_id, after[0].event_id);
    }
}
