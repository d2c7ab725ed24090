/// Log content normalization shared by the Clusterer (spec.md §4.3).
///
/// Pattern order matters: more specific patterns (dates, IPs, UUIDs, hosts,
/// paths) must run before the generic numeric patterns, or a date like
/// `2025-05-08` would be shredded into three `<NUM>` tokens first.
use once_cell::sync::Lazy;
use regex::Regex;

struct NormalizePattern {
    regex: Regex,
    semantic: &'static str,
}

static PATTERNS: Lazy<Vec<NormalizePattern>> = Lazy::new(|| {
    build_patterns(&[
        (r"\d{4}-\d{2}-\d{2}", "<DATE>"),
        (r"\d{2}-\d{2}-\d{2}", "<DATE>"),
        (r"\d{2}/[a-z]{3}/\d{4}", "<DATE>"),
        (r"\d{2}:\d{2}:\d{2}", "<TIME>"),
        (r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b", "<IP>"),
        (
            r"[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}",
            "<ID>",
        ),
        (r"\b[a-z0-9._-]*mesos[-_]slave[-_]*\d+\b", "<HOST>"),
        (r"\b[a-z0-9._-]*node[-_]*\d+\b", "<HOST>"),
        (r"/(?:[\w.-]+/)*[\w.-]+", "<PATH>"),
        (r"\d+\.\d+", "<NUM>"),
        (r"\d+", "<NUM>"),
    ])
});

static PATTERNS_WILDCARD: Lazy<Vec<NormalizePattern>> = Lazy::new(|| {
    build_patterns(&[
        (r"\d{4}-\d{2}-\d{2}", "<*>"),
        (r"\d{2}-\d{2}-\d{2}", "<*>"),
        (r"\d{2}/[a-z]{3}/\d{4}", "<*>"),
        (r"\d{2}:\d{2}:\d{2}", "<*>"),
        (r"\b(?:[0-9]{1,3}\.){3}[0-9]{1,3}\b", "<*>"),
        (
            r"[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}",
            "<*>",
        ),
        (r"\b[a-z0-9._-]*mesos[-_]slave[-_]*\d+\b", "<*>"),
        (r"\b[a-z0-9._-]*node[-_]*\d+\b", "<*>"),
        (r"/(?:[\w.-]+/)*[\w.-]+", "<*>"),
        (r"\d+\.\d+", "<*>"),
        (r"\d+", "<*>"),
    ])
});

static NORMALIZE_TEMPLATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<\*>").unwrap());

fn build_patterns(specs: &[(&str, &'static str)]) -> Vec<NormalizePattern> {
    specs
        .iter()
        .map(|(pattern, semantic)| NormalizePattern {
            regex: Regex::new(pattern).expect("normalize pattern must compile"),
            semantic,
        })
        .collect()
}

/// Lowercase and replace variable substrings with semantic placeholders
/// (`<DATE>`, `<TIME>`, `<IP>`, `<ID>`, `<HOST>`, `<PATH>`, `<NUM>`). Used
/// before vectorizing the unknown set for clustering.
pub fn normalize_log(text: &str) -> String {
    let mut out = text.to_lowercase();
    for pattern in PATTERNS.iter() {
        out = pattern.regex.replace_all(&out, pattern.semantic).into_owned();
    }
    out
}

/// Same pattern set as [`normalize_log`], but every replacement collapses to
/// the single `<*>` token — used when comparing a synthesized template
/// against existing templates.
pub fn normalize_log_template(text: &str) -> String {
    let mut out = text.to_lowercase();
    for pattern in PATTERNS_WILDCARD.iter() {
        out = pattern.regex.replace_all(&out, pattern.semantic).into_owned();
    }
    out
}

/// Collapse `<*>` (case-insensitive) to `*` for template comparison.
pub fn normalize_template(template: &str) -> String {
    NORMALIZE_TEMPLATE_RE
        .replace_all(template, "*")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dates_before_numbers() {
        let out = normalize_log("Request at 2025-05-08 12:34:56 from 10.0.0.1");
        assert_eq!(out, "request at <DATE> <TIME> from <IP>");
    }

    #[test]
    fn normalizes_uuid_and_host() {
        let out = normalize_log("node on mesos-slave-12 id=550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(out, "node on <HOST> id=<ID>");
    }

    #[test]
    fn normalizes_path_and_numbers() {
        let out = normalize_log("writing to /var/log/app-42.log took 17 retries");
        assert_eq!(out, "writing to <PATH> took <NUM> retries");
    }

    #[test]
    fn template_normalization_uses_wildcard() {
        let out = normalize_log_template("task 2025-05-08 started on node-9");
        assert_eq!(out, "task <*> started on <*>");
    }

    #[test]
    fn normalize_template_collapses_case_insensitively() {
        assert_eq!(normalize_template("user <*> logged in"), "user * logged in");
        assert_eq!(normalize_template("user <*> Logged in"), "user * Logged in");
    }
}
