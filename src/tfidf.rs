/// Minimal TF-IDF vectorizer with configurable n-gram range, English
/// stopword removal, and `max_df`/`min_df` document-frequency cutoffs —
/// just enough to reproduce the Clusterer's two vectorization passes
/// (spec.md §4.4 steps 1 and 5) without pulling in a full NLP crate.
use rustc_hash::FxHashMap;

const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should",
    "so", "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "you", "your", "yours", "yourself", "yourselves",
];

#[derive(Debug, Clone, Copy)]
pub struct NgramRange {
    pub min: usize,
    pub max: usize,
}

impl NgramRange {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }
}

/// Fit result: one sparse TF-IDF vector per input document, all sharing the
/// same vocabulary dimension.
#[derive(Debug, Clone)]
pub struct TfidfMatrix {
    pub vocab_size: usize,
    /// Row-major sparse rows: `(feature_index, weight)` pairs, L2-normalized.
    pub rows: Vec<Vec<(usize, f64)>>,
}

impl TfidfMatrix {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.vocab_size == 0
    }

    /// Dense cosine similarity between two rows of this matrix.
    pub fn cosine_similarity(&self, i: usize, j: usize) -> f64 {
        cosine_sparse(&self.rows[i], &self.rows[j])
    }
}

fn cosine_sparse(a: &[(usize, f64)], b: &[(usize, f64)]) -> f64 {
    // Both rows are already L2-normalized, so cosine similarity is just the
    // dot product.
    let mut bi = 0;
    let mut dot = 0.0;
    for &(ai, av) in a {
        while bi < b.len() && b[bi].0 < ai {
            bi += 1;
        }
        if bi < b.len() && b[bi].0 == ai {
            dot += av * b[bi].1;
        }
    }
    dot
}

pub struct TfidfVectorizer {
    ngram_range: NgramRange,
    strip_stopwords: bool,
    max_df: f64,
    min_df: usize,
}

impl TfidfVectorizer {
    pub fn new(ngram_range: NgramRange, strip_stopwords: bool) -> Self {
        Self {
            ngram_range,
            strip_stopwords,
            max_df: 1.0,
            min_df: 1,
        }
    }

    pub fn with_max_df(mut self, max_df: f64) -> Self {
        self.max_df = max_df;
        self
    }

    fn tokenize(&self, doc: &str) -> Vec<String> {
        doc.split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| !t.is_empty())
            .filter(|t| !self.strip_stopwords || !ENGLISH_STOPWORDS.contains(&t.as_str()))
            .collect()
    }

    fn ngrams(&self, tokens: &[String]) -> Vec<String> {
        let mut grams = Vec::new();
        for n in self.ngram_range.min..=self.ngram_range.max {
            if n == 0 || n > tokens.len() {
                continue;
            }
            for window in tokens.windows(n) {
                grams.push(window.join(" "));
            }
        }
        grams
    }

    /// Fit the vocabulary on `documents` and transform them in one pass,
    /// mirroring `TfidfVectorizer.fit_transform` from the upstream
    /// implementation.
    pub fn fit_transform(&self, documents: &[String]) -> TfidfMatrix {
        let n_docs = documents.len();
        if n_docs == 0 {
            return TfidfMatrix {
                vocab_size: 0,
                rows: Vec::new(),
            };
        }

        let doc_ngrams: Vec<Vec<String>> = documents
            .iter()
            .map(|d| self.ngrams(&self.tokenize(d)))
            .collect();

        // Document frequency per term.
        let mut doc_freq: FxHashMap<&str, usize> = FxHashMap::default();
        for grams in &doc_ngrams {
            let mut seen: FxHashMap<&str, bool> = FxHashMap::default();
            for g in grams {
                if seen.insert(g.as_str(), true).is_none() {
                    *doc_freq.entry(g.as_str()).or_insert(0) += 1;
                }
            }
        }

        let max_doc_count = (self.max_df * n_docs as f64).floor() as usize;
        let build_vocab = |apply_max_df: bool| -> FxHashMap<String, usize> {
            let mut vocab: FxHashMap<String, usize> = FxHashMap::default();
            for (term, &df) in doc_freq.iter() {
                if df < self.min_df {
                    continue;
                }
                if apply_max_df && n_docs > 1 && df > max_doc_count.max(self.min_df) {
                    continue;
                }
                let next_id = vocab.len();
                vocab.entry(term.to_string()).or_insert(next_id);
            }
            vocab
        };

        let mut vocab = build_vocab(true);
        // On a small batch, max_df can strip every term two-or-more
        // documents actually share (e.g. a handful of near-duplicate log
        // lines where the shared words look like "corpus-wide stopwords"
        // at that scale), leaving only per-document-unique terms behind.
        // That degenerates every pairwise cosine similarity to exactly
        // zero, which is a corpus-size artifact rather than a genuinely
        // sparse/unrelated batch. Falling back to the unfiltered
        // vocabulary in that case beats losing clustering ability to a
        // max_df cutoff whose intended purpose — pruning ubiquitous filler
        // words while keeping cluster-specific shared vocabulary — has
        // nothing left to act on.
        let has_cross_doc_overlap = vocab
            .keys()
            .any(|term| doc_freq.get(term.as_str()).copied().unwrap_or(0) >= 2);
        if !doc_freq.is_empty() && (vocab.is_empty() || !has_cross_doc_overlap) {
            vocab = build_vocab(false);
        }

        let vocab_size = vocab.len();
        if vocab_size == 0 {
            return TfidfMatrix {
                vocab_size: 0,
                rows: vec![Vec::new(); n_docs],
            };
        }

        // Precompute per-feature idf once, indexed by vocabulary id.
        let mut idf_by_id = vec![0.0f64; vocab_size];
        for (term, &idx) in vocab.iter() {
            let df = *doc_freq.get(term.as_str()).unwrap_or(&0) as f64;
            // Smoothed idf, matching scikit-learn's default smoothing.
            idf_by_id[idx] = ((1.0 + n_docs as f64) / (1.0 + df)).ln() + 1.0;
        }

        let rows: Vec<Vec<(usize, f64)>> = doc_ngrams
            .iter()
            .map(|grams| {
                let mut term_freq: FxHashMap<usize, f64> = FxHashMap::default();
                for g in grams {
                    if let Some(&idx) = vocab.get(g.as_str()) {
                        *term_freq.entry(idx).or_insert(0.0) += 1.0;
                    }
                }
                let mut weighted: Vec<(usize, f64)> = term_freq
                    .into_iter()
                    .map(|(idx, tf)| (idx, tf * idf_by_id[idx]))
                    .collect();

                let norm = weighted.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for (_, w) in weighted.iter_mut() {
                        *w /= norm;
                    }
                }
                weighted.sort_by_key(|(idx, _)| *idx);
                weighted
            })
            .collect();

        TfidfMatrix { vocab_size, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_documents_have_cosine_similarity_one() {
        let docs = vec![
            "task num started".to_string(),
            "task num started".to_string(),
            "completely unrelated content here".to_string(),
        ];
        let vectorizer = TfidfVectorizer::new(NgramRange::new(1, 2), true).with_max_df(0.9);
        let matrix = vectorizer.fit_transform(&docs);
        let sim = matrix.cosine_similarity(0, 1);
        assert!((sim - 1.0).abs() < 1e-9, "expected ~1.0, got {sim}");
    }

    #[test]
    fn unrelated_documents_have_low_similarity() {
        let docs = vec![
            "disk io failure on host".to_string(),
            "user alice logged in successfully".to_string(),
        ];
        let vectorizer = TfidfVectorizer::new(NgramRange::new(1, 3), true);
        let matrix = vectorizer.fit_transform(&docs);
        let sim = matrix.cosine_similarity(0, 1);
        assert!(sim < 0.3, "expected low similarity, got {sim}");
    }

    #[test]
    fn identical_tiny_corpus_does_not_lose_its_whole_vocabulary_to_max_df() {
        let docs = vec![
            "task <num> started".to_string(),
            "task <num> started".to_string(),
            "task <num> started".to_string(),
        ];
        let vectorizer = TfidfVectorizer::new(NgramRange::new(1, 3), true).with_max_df(0.9);
        let matrix = vectorizer.fit_transform(&docs);
        assert!(!matrix.is_empty());
        let sim = matrix.cosine_similarity(0, 1);
        assert!((sim - 1.0).abs() < 1e-9, "expected ~1.0, got {sim}");
    }

    #[test]
    fn small_batch_with_shared_words_keeps_cross_doc_similarity_despite_max_df() {
        let docs = vec![
            "disk io error on sda<num> retrying".to_string(),
            "disk io error on sdb<num> retrying".to_string(),
            "disk io error on sdc<num> retrying".to_string(),
        ];
        let vectorizer = TfidfVectorizer::new(NgramRange::new(1, 3), true).with_max_df(0.9);
        let matrix = vectorizer.fit_transform(&docs);
        let sim = matrix.cosine_similarity(0, 1);
        assert!(sim > 0.5, "expected shared-word similarity, got {sim}");
    }

    #[test]
    fn empty_corpus_yields_empty_matrix() {
        let vectorizer = TfidfVectorizer::new(NgramRange::new(1, 3), true);
        let matrix = vectorizer.fit_transform(&[]);
        assert!(matrix.is_empty());
    }
}
