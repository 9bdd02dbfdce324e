//! Extractive summaries by TextRank: sentences are nodes, Jaccard overlap
//! of their content words is the edge weight, and PageRank picks the most
//! central sentences.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::stopwords::{is_stop_word, words};

pub const DAMPING: f64 = 0.85;
pub const ITERATIONS: usize = 20;
const MIN_WORDS: usize = 4;
const MAX_WORDS: usize = 100;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]+["'”’)\]]*\s+"#).expect("valid sentence regex"));

/// Sentences of `text`, in order, with candidates outside 4..=100 words
/// dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        sentences.push(text[start..m.end()].trim());
        start = m.end();
    }
    sentences.push(text[start..].trim());

    sentences
        .into_iter()
        .filter(|s| (MIN_WORDS..=MAX_WORDS).contains(&s.split_whitespace().count()))
        .collect()
}

fn content_words(sentence: &str) -> HashSet<String> {
    words(sentence).filter(|w| !is_stop_word(w)).collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Weighted PageRank by power iteration from uniform scores. A node with no
/// edges keeps only the `(1 - damping) / n` teleport share.
pub fn pagerank(weights: &[Vec<f64>], damping: f64, iterations: usize) -> Vec<f64> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }
    let out_weight: Vec<f64> = weights.iter().map(|row| row.iter().sum()).collect();
    let base = (1.0 - damping) / n as f64;
    let mut scores = vec![1.0 / n as f64; n];

    for _ in 0..iterations {
        let next: Vec<f64> = (0..n)
            .map(|i| {
                let incoming: f64 = (0..n)
                    .filter(|&j| j != i && out_weight[j] > 0.0)
                    .map(|j| weights[j][i] / out_weight[j] * scores[j])
                    .sum();
                base + damping * incoming
            })
            .collect();
        scores = next;
    }
    scores
}

fn similarity_graph(sentences: &[&str]) -> Vec<Vec<f64>> {
    let tokens: Vec<HashSet<String>> = sentences.iter().map(|s| content_words(s)).collect();
    let n = tokens.len();
    let mut weights = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let w = jaccard(&tokens[i], &tokens[j]);
            weights[i][j] = w;
            weights[j][i] = w;
        }
    }
    weights
}

/// Pick the `k` most central sentences and return them in document order,
/// joined by single spaces. Text with `k` or fewer sentences comes back as
/// is (trimmed).
pub fn summarize(text: &str, k: usize) -> String {
    let sentences = split_sentences(text);
    if sentences.len() <= k {
        return text.trim().to_string();
    }

    let scores = pagerank(&similarity_graph(&sentences), DAMPING, ITERATIONS);

    let mut ranked: Vec<usize> = (0..sentences.len()).collect();
    ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    let mut chosen: Vec<usize> = ranked.into_iter().take(k).collect();
    chosen.sort_unstable();

    chosen
        .into_iter()
        .map(|i| sentences[i])
        .collect::<Vec<_>>()
        .join(" ")
}
