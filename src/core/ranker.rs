//! Sentence Ranker (optional).
//!
//! A TextRank-style filter: splits text into sentences, builds a
//! similarity graph, scores sentences by iterative PageRank, and keeps
//! the top-scoring fraction in their original chronological order. No
//! crate in the dependency stack implements this; it is a self-contained
//! numeric algorithm written directly from its mathematical description.

use std::collections::HashMap;

/// Tunable parameters for the ranker, all with the documented defaults.
#[derive(Debug, Clone)]
pub struct RankerConfig {
    /// Bag-of-words cosine similarity floor for drawing an edge between
    /// two sentences.
    pub similarity_floor: f64,
    /// PageRank damping factor.
    pub damping: f64,
    /// Convergence threshold on the L∞ norm of the score delta.
    pub epsilon: f64,
    /// Hard cap on PageRank iterations.
    pub max_iterations: u32,
    /// Percentage (10-50) of sentences to keep, by score.
    pub top_percent: u8,
    /// Absolute minimum candidate count below which the ranker falls back
    /// to the unfiltered text.
    pub min_absolute: usize,
    /// Minimum percentage of the original sentence count below which the
    /// ranker falls back to the unfiltered text.
    pub min_percentage: u8,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            similarity_floor: 0.1,
            damping: 0.85,
            epsilon: 1e-4,
            max_iterations: 100,
            top_percent: 25,
            min_absolute: 15,
            min_percentage: 10,
        }
    }
}

impl RankerConfig {
    /// Clamp `top_percent` into the documented 10-50 bound.
    pub fn clamped(mut self) -> Self {
        self.top_percent = self.top_percent.clamp(10, 50);
        self
    }
}

/// Subtitle-aware sentence segmentation: subtitles are already one
/// dialogue fragment per line (the Normalizer preserves line boundaries
/// in Clean text), so a line is the segmentation unit; lines that
/// themselves contain multiple sentence-ending punctuation marks are
/// further split, preserving chronological order.
fn segment_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut start = 0;
        let bytes = line.as_bytes();
        for (i, &b) in bytes.iter().enumerate() {
            if matches!(b, b'.' | b'!' | b'?') {
                let candidate = line[start..=i].trim();
                if !candidate.is_empty() {
                    sentences.push(candidate.to_string());
                }
                start = i + 1;
            }
        }
        let rest = line[start..].trim();
        if !rest.is_empty() {
            sentences.push(rest.to_string());
        }
    }
    sentences
}

fn bag_of_words(sentence: &str) -> HashMap<String, f64> {
    let mut bag = HashMap::new();
    for word in sentence.split_whitespace() {
        let normalized: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if normalized.is_empty() {
            continue;
        }
        *bag.entry(normalized.to_lowercase()).or_insert(0.0) += 1.0;
    }
    bag
}

fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().map(|(k, v)| v * b.get(k).unwrap_or(&0.0)).sum();
    let norm_a = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Run iterative PageRank over the sentence-similarity graph, returning
/// one score per input sentence, in input order.
fn pagerank(adjacency: &[Vec<(usize, f64)>], config: &RankerConfig) -> Vec<f64> {
    let n = adjacency.len();
    if n == 0 {
        return Vec::new();
    }
    let mut scores = vec![1.0 / n as f64; n];
    let out_weight: Vec<f64> = adjacency
        .iter()
        .map(|edges| edges.iter().map(|(_, w)| w).sum())
        .collect();

    for _ in 0..config.max_iterations {
        let mut next = vec![(1.0 - config.damping) / n as f64; n];
        for (src, edges) in adjacency.iter().enumerate() {
            if out_weight[src] == 0.0 {
                continue;
            }
            for &(dst, weight) in edges {
                next[dst] += config.damping * scores[src] * (weight / out_weight[src]);
            }
        }
        let max_delta = next
            .iter()
            .zip(scores.iter())
            .map(|(n, o)| (n - o).abs())
            .fold(0.0_f64, f64::max);
        scores = next;
        if max_delta < config.epsilon {
            break;
        }
    }
    scores
}

/// Filter `clean_text` to its plot-relevant sentences. Returns the input
/// unchanged when the candidate set would be too small relative to the
/// configured floors (§4.2's fallback rule); the result is always a
/// subsequence of the input sentences, in original order.
pub fn rank(clean_text: &str, config: &RankerConfig) -> String {
    let config = config.clone().clamped();
    let sentences = segment_sentences(clean_text);
    if sentences.is_empty() {
        return String::new();
    }

    let bags: Vec<HashMap<String, f64>> = sentences.iter().map(|s| bag_of_words(s)).collect();
    let mut adjacency = vec![Vec::new(); sentences.len()];
    for i in 0..sentences.len() {
        for j in 0..sentences.len() {
            if i == j {
                continue;
            }
            let sim = cosine_similarity(&bags[i], &bags[j]);
            if sim > config.similarity_floor {
                adjacency[i].push((j, sim));
            }
        }
    }

    let scores = pagerank(&adjacency, &config);

    let keep_count = ((sentences.len() as f64) * (config.top_percent as f64) / 100.0).ceil() as usize;
    let keep_count = keep_count.max(1).min(sentences.len());

    let min_percentage_count =
        ((sentences.len() as f64) * (config.min_percentage as f64) / 100.0).ceil() as usize;
    if keep_count < config.min_absolute && keep_count < min_percentage_count {
        return sentences.join(" ");
    }

    let mut ranked_indices: Vec<usize> = (0..sentences.len()).collect();
    ranked_indices.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap());
    let mut kept: Vec<usize> = ranked_indices.into_iter().take(keep_count).collect();
    kept.sort_unstable();

    kept.into_iter()
        .map(|i| sentences[i].clone())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repeated_plot_text(n: usize) -> String {
        (0..n)
            .map(|i| format!("Episode sentence number {i} about the detective case."))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn output_is_a_subsequence_of_input_sentences() {
        let text = repeated_plot_text(40);
        let config = RankerConfig::default();
        let filtered = rank(&text, &config);
        for word in filtered.split_whitespace() {
            assert!(text.contains(word), "{word} not found in source text");
        }
    }

    #[test]
    fn deterministic_for_a_fixed_configuration() {
        let text = repeated_plot_text(30);
        let config = RankerConfig::default();
        let a = rank(&text, &config);
        let b = rank(&text, &config);
        assert_eq!(a, b);
    }

    #[test]
    fn falls_back_to_unfiltered_text_when_too_few_sentences() {
        let text = "Only one sentence here.";
        let config = RankerConfig::default();
        let filtered = rank(text, &config);
        assert_eq!(filtered, "Only one sentence here.");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(rank("", &RankerConfig::default()), "");
    }

    #[test]
    fn top_percent_is_clamped_into_bounds() {
        let config = RankerConfig {
            top_percent: 5,
            ..RankerConfig::default()
        }
        .clamped();
        assert_eq!(config.top_percent, 10);
        let config = RankerConfig {
            top_percent: 90,
            ..RankerConfig::default()
        }
        .clamped();
        assert_eq!(config.top_percent, 50);
    }
}
