/// Online clustering of unmatched log content into new event templates
/// (spec.md §4.4), grounded in the upstream `ClusteringService`.
///
/// Pipeline per tick, over the current unknown set:
///   1. normalize_log every unknown record
///   2. TF-IDF vectorize (1-3 grams, english stopwords, max_df 0.9)
///   3. DBSCAN(eps=0.5, min_samples=2, metric=cosine) over the vectors
///   4. token-align each cluster into a `<*>`-templated string
///   5. drop clusters whose template is too generic (wildcard ratio >= 0.8)
///   6. merge the new templates into the existing catalog by a second
///      TF-IDF pass (1-2 grams) + greedy similarity grouping (>= 0.7)
///   7. re-home every clustered log onto its survivor template, normalized
///      exact match first, `strsim` fuzzy partial-ratio (>= 70) fallback
///   8. anything left over (too-generic clusters, DBSCAN outliers) goes to
///      the reserved E0 bucket.
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::{EventTemplate, LogRecord, UNCLASSIFIABLE_EVENT_ID};
use crate::preprocess::{normalize_log, normalize_template};
use crate::tfidf::{NgramRange, TfidfVectorizer};

const DBSCAN_EPS: f64 = 0.5;
const DBSCAN_MIN_SAMPLES: usize = 2;
const GENERICITY_THRESHOLD: f64 = 0.8;
const MERGE_SIMILARITY_THRESHOLD: f64 = 0.7;
const FUZZY_MATCH_THRESHOLD: f64 = 70.0;

pub struct Clusterer;

/// Outcome of one clustering pass: the full, updated template catalog (new
/// survivors appended after whatever the caller passed in) and the set of
/// event ids newly added this tick, so the caller can persist only the diff.
pub struct ClusterResult {
    pub templates: Vec<EventTemplate>,
    pub newly_added: Vec<EventTemplate>,
}

impl Clusterer {
    /// Cluster `unknown` logs (mutated in place with their resolved
    /// `event_id`/`is_anomaly`) against the `existing` catalog, returning
    /// the templates to persist.
    pub fn cluster_and_generate_templates(
        unknown: &mut [LogRecord],
        existing: &[EventTemplate],
    ) -> ClusterResult {
        if unknown.is_empty() {
            return ClusterResult {
                templates: existing.to_vec(),
                newly_added: Vec::new(),
            };
        }

        let normalized: Vec<String> = unknown.iter().map(|log| normalize_log(&log.content)).collect();
        let valid_indices: Vec<usize> = normalized
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.trim().is_empty())
            .map(|(i, _)| i)
            .collect();

        if valid_indices.is_empty() {
            // Normalization left nothing to vectorize (spec.md §7): the
            // catalog is returned unchanged and every log keeps the
            // is_anomaly=true/no-event_id state the Matcher already left it
            // in, rather than being forced into the E0 bucket.
            return ClusterResult {
                templates: existing.to_vec(),
                newly_added: Vec::new(),
            };
        }

        let valid_docs: Vec<String> = valid_indices.iter().map(|&i| normalized[i].clone()).collect();
        let vectorizer = TfidfVectorizer::new(NgramRange::new(1, 3), true).with_max_df(0.9);
        let matrix = vectorizer.fit_transform(&valid_docs);

        let labels = dbscan_cosine(&matrix, DBSCAN_EPS, DBSCAN_MIN_SAMPLES);

        // Group valid_indices positions by cluster label, skipping outliers
        // (-1). A `BTreeMap` keeps iteration in ascending label order so the
        // synthesized-template order (and everything downstream of it: merge
        // candidate order, survivor selection, sequential E{n} assignment)
        // is deterministic across runs over the same input, matching the
        // upstream's insertion-ordered `defaultdict`.
        let mut clusters: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (pos, &label) in labels.iter().enumerate() {
            if label >= 0 {
                clusters.entry(label).or_default().push(valid_indices[pos]);
            }
        }

        let mut raw_templates: Vec<String> = Vec::new();
        let mut log_to_raw_template: HashMap<usize, usize> = HashMap::new();
        // Only logs whose cluster's synthesized template is rejected for
        // genericity (Step 4) land in the E0 bucket. DBSCAN outliers and
        // logs that normalized away to nothing are simply left as they came
        // out of the Matcher: is_anomaly=true, event_id unset (spec.md §4.4
        // Step 2, §7, Scenario C).
        let mut generic_log_indices: Vec<usize> = Vec::new();

        for indices in clusters.values() {
            let cluster_contents: Vec<&str> =
                indices.iter().map(|&i| unknown[i].content.as_str()).collect();
            let template = generate_template_from_cluster(&cluster_contents);

            if is_template_too_generic(&template, GENERICITY_THRESHOLD) {
                generic_log_indices.extend(indices.iter().copied());
                continue;
            }

            let template_idx = raw_templates.len();
            raw_templates.push(template);
            for &i in indices {
                log_to_raw_template.insert(i, template_idx);
            }
        }

        // Build candidate templates: existing catalog + deduplicated new
        // raw templates, each new one provisionally abnormal.
        let mut candidates: Vec<EventTemplate> = existing.to_vec();
        let mut seen_templates: HashSet<String> =
            existing.iter().map(|t| t.template.clone()).collect();
        let mut raw_template_to_candidate_idx: HashMap<usize, usize> = HashMap::new();

        for (raw_idx, template) in raw_templates.iter().enumerate() {
            if seen_templates.contains(template) {
                let existing_idx = candidates.iter().position(|t| &t.template == template);
                if let Some(idx) = existing_idx {
                    raw_template_to_candidate_idx.insert(raw_idx, idx);
                }
                continue;
            }
            seen_templates.insert(template.clone());
            let candidate_idx = candidates.len();
            candidates.push(EventTemplate::new("", template.clone()).with_abnormal(true));
            raw_template_to_candidate_idx.insert(raw_idx, candidate_idx);
        }

        let merged = merge_similar_templates(&candidates, MERGE_SIMILARITY_THRESHOLD);

        let (final_templates, newly_added) = assign_ids(existing, &merged);

        let normalized_to_event: HashMap<String, String> = final_templates
            .iter()
            .map(|t| (normalize_template(&t.template), t.event_id.clone()))
            .collect();

        for (&log_idx, &raw_idx) in log_to_raw_template.iter() {
            let raw_template = &raw_templates[raw_idx];
            let norm = normalize_template(raw_template);

            if let Some(event_id) = normalized_to_event.get(&norm) {
                unknown[log_idx].mark_matched(event_id, true);
                continue;
            }

            let mut best_score = 0.0f64;
            let mut best_event_id: Option<&str> = None;
            for (norm2, event_id) in normalized_to_event.iter() {
                let score = fuzzy_partial_ratio(&norm, norm2);
                if score > best_score {
                    best_score = score;
                    best_event_id = Some(event_id.as_str());
                }
            }

            if let Some(event_id) = best_event_id {
                if best_score >= FUZZY_MATCH_THRESHOLD {
                    unknown[log_idx].mark_matched(event_id, true);
                }
            }
        }

        route_to_generic_bucket(unknown, &generic_log_indices);

        ClusterResult {
            templates: final_templates,
            newly_added,
        }
    }
}

fn route_to_generic_bucket(logs: &mut [LogRecord], indices: &[usize]) {
    for &i in indices {
        logs[i].mark_matched(UNCLASSIFIABLE_EVENT_ID, true);
    }
}

/// Token-align a cluster of raw log lines into a `<*>`-templated string,
/// collapsing consecutive wildcards into one.
fn generate_template_from_cluster(logs: &[&str]) -> String {
    if logs.is_empty() {
        return String::new();
    }
    if logs.len() == 1 {
        return logs[0].to_string();
    }

    let token_arrays: Vec<Vec<&str>> = logs.iter().map(|l| l.split_whitespace().collect()).collect();
    let max_len = token_arrays.iter().map(|t| t.len()).max().unwrap_or(0);

    let mut template_tokens: Vec<String> = Vec::with_capacity(max_len);
    for i in 0..max_len {
        let mut unique: HashSet<&str> = HashSet::new();
        for tokens in &token_arrays {
            if let Some(&tok) = tokens.get(i) {
                unique.insert(tok);
            }
        }
        if unique.len() == 1 {
            template_tokens.push((*unique.iter().next().unwrap()).to_string());
        } else {
            template_tokens.push("<*>".to_string());
        }
    }

    let mut merged: Vec<String> = Vec::with_capacity(template_tokens.len());
    let mut previous_was_wildcard = false;
    for token in template_tokens {
        let is_wildcard = token == "<*>";
        if is_wildcard && previous_was_wildcard {
            continue;
        }
        previous_was_wildcard = is_wildcard;
        merged.push(token);
    }

    merged.join(" ")
}

fn is_template_too_generic(template: &str, threshold: f64) -> bool {
    let tokens: Vec<&str> = template.trim().split_whitespace().collect();
    if tokens.is_empty() {
        return true;
    }
    let wildcard_count = tokens.iter().filter(|t| **t == "<*>").count();
    (wildcard_count as f64 / tokens.len() as f64) >= threshold
}

/// Greedy merge: for each not-yet-merged template in order, pull in every
/// later template whose cosine similarity (over a 1-2 gram TF-IDF pass on
/// normalized templates) clears `threshold`; the group's representative is
/// the median-length member.
fn merge_similar_templates(templates: &[EventTemplate], threshold: f64) -> Vec<EventTemplate> {
    if templates.is_empty() {
        return Vec::new();
    }

    let normalized: Vec<String> = templates.iter().map(|t| normalize_template(&t.template)).collect();
    let vectorizer = TfidfVectorizer::new(NgramRange::new(1, 2), true);
    let matrix = vectorizer.fit_transform(&normalized);

    let n = templates.len();
    let mut already_merged = vec![false; n];
    let mut result = Vec::new();

    for i in 0..n {
        if already_merged[i] {
            continue;
        }
        let mut group = vec![i];
        if !matrix.is_empty() {
            for j in (i + 1)..n {
                if already_merged[j] {
                    continue;
                }
                if matrix.cosine_similarity(i, j) >= threshold {
                    group.push(j);
                    already_merged[j] = true;
                }
            }
        }

        let mut sorted_group = group.clone();
        sorted_group.sort_by_key(|&idx| templates[idx].template.len());
        let chosen_idx = sorted_group[sorted_group.len() / 2];
        result.push(templates[chosen_idx].clone());
    }

    result
}

/// Assign event ids to the merged survivor set, preserving ids that already
/// existed in `existing` (recommended correction to the upstream's full
/// per-tick renumbering, see DESIGN.md OQ-1) and minting fresh `E{n}` ids
/// only for genuinely new templates.
fn assign_ids(existing: &[EventTemplate], merged: &[EventTemplate]) -> (Vec<EventTemplate>, Vec<EventTemplate>) {
    let mut next_id: u64 = existing
        .iter()
        .filter_map(|t| t.event_id.strip_prefix('E'))
        .filter_map(|n| n.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
        + 1;

    let existing_by_template: HashMap<&str, &EventTemplate> =
        existing.iter().map(|t| (t.template.as_str(), t)).collect();

    let mut final_templates = Vec::with_capacity(merged.len());
    let mut newly_added = Vec::new();

    for template in merged {
        if let Some(existing_template) = existing_by_template.get(template.template.as_str()) {
            final_templates.push((*existing_template).clone());
            continue;
        }
        if !template.event_id.is_empty() {
            // Already has a stable id from a prior tick's survivor set.
            final_templates.push(template.clone());
            continue;
        }
        let event_id = format!("E{next_id}");
        next_id += 1;
        let assigned = EventTemplate::new(event_id, template.template.clone()).with_abnormal(template.is_abnormal);
        final_templates.push(assigned.clone());
        newly_added.push(assigned);
    }

    (final_templates, newly_added)
}

/// Approximate fuzzywuzzy's `partial_ratio`: the best normalized Levenshtein
/// similarity of the shorter string against any equal-length window of the
/// longer one, scaled to 0-100.
fn fuzzy_partial_ratio(a: &str, b: &str) -> f64 {
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if shorter.is_empty() {
        return if longer.is_empty() { 100.0 } else { 0.0 };
    }
    if longer.len() <= shorter.len() {
        return strsim::normalized_levenshtein(shorter, longer) * 100.0;
    }

    let shorter_chars: Vec<char> = shorter.chars().collect();
    let longer_chars: Vec<char> = longer.chars().collect();
    let window = shorter_chars.len();

    let mut best = 0.0f64;
    for start in 0..=(longer_chars.len() - window) {
        let slice: String = longer_chars[start..start + window].iter().collect();
        let score = strsim::normalized_levenshtein(shorter, &slice) * 100.0;
        if score > best {
            best = score;
        }
    }
    best
}

/// Minimal DBSCAN over a precomputed cosine-similarity TF-IDF matrix,
/// mirroring `sklearn.cluster.DBSCAN(eps, min_samples, metric="cosine")`.
/// Returns one label per row: `-1` for noise, else a non-negative cluster id.
fn dbscan_cosine(matrix: &crate::tfidf::TfidfMatrix, eps: f64, min_samples: usize) -> Vec<i64> {
    let n = matrix.rows.len();
    if n == 0 {
        return Vec::new();
    }

    let neighbors = |i: usize| -> Vec<usize> {
        (0..n)
            .filter(|&j| {
                if j == i {
                    return false;
                }
                let distance = 1.0 - matrix.cosine_similarity(i, j);
                distance <= eps
            })
            .collect()
    };

    let mut labels = vec![-1i64; n];
    let mut visited = vec![false; n];
    let mut next_cluster = 0i64;

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;

        let mut seed_set = neighbors(i);
        // +1 because sklearn's min_samples counts the point itself.
        if seed_set.len() + 1 < min_samples {
            continue;
        }

        labels[i] = next_cluster;
        let mut queue = seed_set.clone();
        while let Some(q) = queue.pop() {
            if !visited[q] {
                visited[q] = true;
                let q_neighbors = neighbors(q);
                if q_neighbors.len() + 1 >= min_samples {
                    for &qn in &q_neighbors {
                        if !seed_set.contains(&qn) {
                            seed_set.push(qn);
                            queue.push(qn);
                        }
                    }
                }
            }
            if labels[q] == -1 {
                labels[q] = next_cluster;
            }
        }

        next_cluster += 1;
    }

    labels
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

    #[test]
    fn template_from_identical_cluster_has_no_wildcards() {
        let logs = vec!["boot complete", "boot complete"];
        let template = generate_template_from_cluster(&logs);
        assert_eq!(template, "boot complete");
    }

    #[test]
    fn template_from_varying_tokens_has_single_wildcard() {
        let logs = vec!["user alice logged in", "user bob logged in"];
        let template = generate_template_from_cluster(&logs);
        assert_eq!(template, "user <*> logged in");
    }

    #[test]
    fn consecutive_wildcards_collapse_to_one() {
        let logs = vec!["start 1 2 done", "start 9 7 done"];
        let template = generate_template_from_cluster(&logs);
        assert_eq!(template, "start <*> done");
    }

    #[test]
    fn fully_wildcarded_template_is_too_generic() {
        assert!(is_template_too_generic("<*> <*> <*>", GENERICITY_THRESHOLD));
        assert!(!is_template_too_generic("error <*> occurred", GENERICITY_THRESHOLD));
    }

    // Scenario D: a cluster of near-duplicate unknown logs becomes one new
    // template, and every member of the cluster is re-homed onto it.
    #[test]
    fn cluster_forms_new_template_and_routes_members() {
        let mut unknown = vec![
            log("disk io error on sda1 retrying"),
            log("disk io error on sdb2 retrying"),
            log("disk io error on sdc3 retrying"),
        ];
        let result = Clusterer::cluster_and_generate_templates(&mut unknown, &[]);

        assert_eq!(result.newly_added.len(), 1);
        let event_id = result.newly_added[0].event_id.clone();
        for rec in &unknown {
            assert_eq!(rec.event_id.as_deref(), Some(event_id.as_str()));
            assert!(rec.is_anomaly);
        }
    }

    // Scenario C: a singleton unknown log has no DBSCAN neighbors
    // (min_samples=2), stays an outlier, and is left with is_anomaly=true
    // and no event_id rather than being routed to E0.
    #[test]
    fn singleton_unknown_log_stays_unset_as_dbscan_outlier() {
        let mut unknown = vec![log("a wildly unique one-off event id 8675309")];
        let result = Clusterer::cluster_and_generate_templates(&mut unknown, &[]);

        assert!(result.newly_added.is_empty());
        assert!(unknown[0].event_id.is_none());
        assert!(unknown[0].is_anomaly);
    }

    // Scenario E: a cluster whose synthesized template is rejected for
    // genericity routes every member straight to E0, independent of however
    // the cluster was formed.
    #[test]
    fn generic_template_cluster_routes_members_to_e0() {
        let mut unknown = vec![log("a b c d"), log("w x y z")];
        route_to_generic_bucket(&mut unknown, &[0, 1]);
        for rec in &unknown {
            assert_eq!(rec.event_id.as_deref(), Some(UNCLASSIFIABLE_EVENT_ID));
            assert!(rec.is_anomaly);
        }
    }

    #[test]
    fn fuzzy_partial_ratio_of_identical_strings_is_100() {
        assert!((fuzzy_partial_ratio("abc", "abc") - 100.0).abs() < 1e-9);
    }
}
