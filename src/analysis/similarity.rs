use std::collections::HashMap;

use anyhow::anyhow;

use crate::db::Repository;
use crate::error::{AppError, Result};

use super::stopwords::{is_stop_word, words};

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarPost {
    pub post_id: String,
    pub score: f64,
}

/// Anything that can score documents pairwise by position.
pub trait SimilaritySource {
    fn ids(&self) -> &[String];

    fn score(&self, a: usize, b: usize) -> f64;

    /// Best `n` matches for `id`, excluding itself, at or above `floor`,
    /// highest first.
    fn most_similar(&self, id: &str, n: usize, floor: f64) -> Vec<SimilarPost> {
        let ids = self.ids();
        let Some(target) = ids.iter().position(|i| i == id) else {
            return Vec::new();
        };

        let mut matches: Vec<SimilarPost> = (0..ids.len())
            .filter(|&i| i != target)
            .map(|i| SimilarPost {
                post_id: ids[i].clone(),
                score: self.score(target, i),
            })
            .filter(|m| m.score >= floor)
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.post_id.cmp(&b.post_id)));
        matches.truncate(n);
        matches
    }
}

/// Lowercase alphanumeric terms longer than two characters, stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    words(text)
        .filter(|w| w.chars().count() > 2 && !is_stop_word(w))
        .collect()
}

type SparseVector = HashMap<String, f64>;

fn sparse_cosine(a: &SparseVector, b: &SparseVector) -> f64 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(term, w)| large.get(term).map(|v| w * v))
        .sum();
    let norm_a = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b = b.values().map(|w| w * w).sum::<f64>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// TF-IDF vectors over a fixed corpus.
pub struct TfIdfIndex {
    ids: Vec<String>,
    vectors: Vec<SparseVector>,
}

impl TfIdfIndex {
    pub fn build(documents: Vec<(String, String)>) -> Self {
        let tokenized: Vec<(String, Vec<String>)> = documents
            .into_iter()
            .map(|(id, text)| (id, tokenize(&text)))
            .collect();

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for (_, tokens) in &tokenized {
            let mut seen: Vec<&str> = tokens.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *doc_freq.entry(term).or_default() += 1;
            }
        }

        let n = tokenized.len() as f64;
        let vectors: Vec<SparseVector> = tokenized
            .iter()
            .map(|(_, tokens)| {
                let mut tf: HashMap<&str, usize> = HashMap::new();
                for t in tokens {
                    *tf.entry(t.as_str()).or_default() += 1;
                }
                let len = tokens.len() as f64;
                tf.into_iter()
                    .map(|(term, count)| {
                        let idf = (n / (1.0 + doc_freq[term] as f64)).ln();
                        (term.to_string(), count as f64 / len * idf)
                    })
                    .collect()
            })
            .collect();

        Self {
            ids: tokenized.into_iter().map(|(id, _)| id).collect(),
            vectors,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl SimilaritySource for TfIdfIndex {
    fn ids(&self) -> &[String] {
        &self.ids
    }

    fn score(&self, a: usize, b: usize) -> f64 {
        sparse_cosine(&self.vectors[a], &self.vectors[b])
    }
}

/// Cosine similarity of two dense vectors. Mismatched lengths or a zero
/// vector score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Precomputed embeddings of one fixed dimension, e.g. from an external model.
pub struct EmbeddingIndex {
    dimensions: usize,
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Add or replace the vector for `id`.
    pub fn insert(&mut self, id: String, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(AppError::Other(anyhow!(
                "embedding for {} has {} dimensions, expected {}",
                id,
                vector.len(),
                self.dimensions
            )));
        }
        match self.ids.iter().position(|i| *i == id) {
            Some(pos) => self.vectors[pos] = vector,
            None => {
                self.ids.push(id);
                self.vectors.push(vector);
            }
        }
        Ok(())
    }
}

impl SimilaritySource for EmbeddingIndex {
    fn ids(&self) -> &[String] {
        &self.ids
    }

    fn score(&self, a: usize, b: usize) -> f64 {
        cosine_similarity(&self.vectors[a], &self.vectors[b]) as f64
    }
}

/// Lexical neighbours of one stored post across the whole archive.
pub async fn similar_posts(repo: &Repository, post_id: &str, n: usize, floor: f64) -> Result<Vec<SimilarPost>> {
    let documents = repo.post_texts(None).await?;
    if !documents.iter().any(|(id, _)| id == post_id) {
        return Err(AppError::NotFound(format!("post {}", post_id)));
    }
    let index = TfIdfIndex::build(documents);
    tracing::debug!("Built TF-IDF index over {} posts", index.len());
    Ok(index.most_similar(post_id, n, floor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> TfIdfIndex {
        TfIdfIndex::build(vec![
            ("rust".into(), "Rust ownership and borrowing make memory management safe".into()),
            ("rust2".into(), "Borrowing rules in Rust keep memory access safe".into()),
            ("bread".into(), "Sourdough bread needs flour water salt and patience".into()),
            ("garden".into(), "Tomatoes in the garden need water and sunshine".into()),
            ("empty".into(), "a an of".into()),
        ])
    }

    #[test]
    fn tokenizer_drops_short_words_and_stop_words() {
        assert_eq!(tokenize("The cat, an OX and Rust-lang!"), vec!["cat", "rust", "lang"]);
    }

    #[test]
    fn scores_are_symmetric_and_self_is_one() {
        let index = corpus();
        for a in 0..index.len() - 1 {
            assert!((index.score(a, a) - 1.0).abs() < 1e-9);
            for b in 0..index.len() {
                assert!((index.score(a, b) - index.score(b, a)).abs() < 1e-12);
            }
        }
        // No terms survive tokenizing, so nothing is similar to it.
        let empty = index.len() - 1;
        assert_eq!(index.score(empty, empty), 0.0);
    }

    #[test]
    fn most_similar_excludes_self_and_respects_floor() {
        let index = corpus();
        let top = index.most_similar("rust", 3, 0.05);
        assert_eq!(top.first().map(|m| m.post_id.as_str()), Some("rust2"));
        assert!(top.iter().all(|m| m.post_id != "rust" && m.score >= 0.05));
        assert!(top.iter().all(|m| m.post_id != "bread"));

        assert!(index.most_similar("unknown", 3, 0.0).is_empty());
        assert_eq!(index.most_similar("rust", 1, -1.0).len(), 1);
    }

    #[test]
    fn dense_cosine() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn embedding_index_ranks_like_tfidf() {
        let mut index = EmbeddingIndex::new(3);
        index.insert("a".into(), vec![1.0, 0.0, 0.0]).unwrap();
        index.insert("b".into(), vec![0.9, 0.1, 0.0]).unwrap();
        index.insert("c".into(), vec![0.0, 0.0, 1.0]).unwrap();
        assert!(index.insert("bad".into(), vec![1.0]).is_err());

        let top = index.most_similar("a", 5, 0.05);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].post_id, "b");

        index.insert("c".into(), vec![1.0, 0.0, 0.0]).unwrap();
        assert_eq!(index.most_similar("a", 5, 0.05)[0].post_id, "c");
    }
}
