//! Vector comparison and ranking primitives.
//!
//! Cosine similarity here is a *total* function: vectors of different length
//! or with a zero norm simply score `0.0` instead of raising an error, so a
//! degenerate embedding can never abort a query.
//!
//! # Example
//!
//! ```rust
//! use mnemos_memory::similarity::cosine_similarity;
//!
//! assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]), 1.0);
//! assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
//! ```

use mnemos_types::{KnowledgeNode, MemoryItem};

// ─────────────────────────────────────────────────────────────────────────────
// HasEmbedding
// ─────────────────────────────────────────────────────────────────────────────

/// Anything that can be ranked against a query embedding.
pub trait HasEmbedding {
    fn embedding(&self) -> &[f64];
}

impl HasEmbedding for KnowledgeNode {
    fn embedding(&self) -> &[f64] {
        &self.embedding
    }
}

impl HasEmbedding for MemoryItem {
    fn embedding(&self) -> &[f64] {
        &self.embedding
    }
}

impl<T: HasEmbedding + ?Sized> HasEmbedding for &T {
    fn embedding(&self) -> &[f64] {
        (**self).embedding()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cosine similarity
// ─────────────────────────────────────────────────────────────────────────────

/// `dot(a, b) / (‖a‖·‖b‖)`, in `[-1.0, 1.0]`.
///
/// Returns exactly `0.0` when the lengths differ or either norm is zero.
/// Each vector is first divided by its largest absolute component so the
/// squared norms can neither overflow nor underflow. The denominator is then
/// taken as `sqrt(‖a‖²·‖b‖²)`, which makes `cosine_similarity(v, v)` exactly
/// `1.0` and `cosine_similarity(v, -v)` exactly `-1.0` for any nonzero `v`.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let scale_a = max_abs(a);
    let scale_b = max_abs(b);
    if scale_a == 0.0 || scale_b == 0.0 {
        return 0.0;
    }
    let (mut dot, mut norm_a_sq, mut norm_b_sq) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (x / scale_a, y / scale_b);
        dot += x * y;
        norm_a_sq += x * x;
        norm_b_sq += y * y;
    }
    let sim = dot / (norm_a_sq * norm_b_sq).sqrt();
    if sim.is_finite() { sim.clamp(-1.0, 1.0) } else { 0.0 }
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |m: f64, x| m.max(x.abs()))
}

/// Score every item against `query`. The output is **unsorted**; callers
/// decide the ordering.
pub fn rank<T, I>(items: I, query: &[f64]) -> Vec<(T, f64)>
where
    T: HasEmbedding,
    I: IntoIterator<Item = T>,
{
    items
        .into_iter()
        .map(|item| {
            let score = cosine_similarity(item.embedding(), query);
            (item, score)
        })
        .collect()
}

/// Stable descending sort by score.
pub fn sort_by_score_desc<T>(scored: &mut [(T, f64)]) {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
}

// ─────────────────────────────────────────────────────────────────────────────
// Vector helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Arithmetic mean of equal-length vectors, or `None` when `vectors` is empty
/// or the lengths disagree.
pub fn mean_vector<'a, I>(vectors: I) -> Option<Vec<f64>>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let mut iter = vectors.into_iter();
    let mut sum = iter.next()?.to_vec();
    let mut count = 1usize;
    for v in iter {
        if v.len() != sum.len() {
            return None;
        }
        for (s, x) in sum.iter_mut().zip(v) {
            *s += x;
        }
        count += 1;
    }
    let n = count as f64;
    sum.iter_mut().for_each(|s| *s /= n);
    Some(sum)
}

/// Scale `v` to unit L2 norm in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
