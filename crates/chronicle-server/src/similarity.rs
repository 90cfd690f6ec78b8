// crates/chronicle-server/src/similarity.rs
// Similarity kernel: cosine, k-nearest-neighbour, memory entropy

/// Cosine similarity in [-1, 1]. Returns 0 when dimensions differ or either
/// magnitude is zero, so degenerate vectors never poison a ranking.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// The `k` entries most similar to `query`, descending. Entries without an
/// embedding are skipped.
pub fn knn<'a, T>(
    query: &[f32],
    items: impl IntoIterator<Item = (&'a T, Option<&'a [f32]>)>,
    k: usize,
) -> Vec<(&'a T, f64)> {
    let mut scored: Vec<(&T, f64)> = items
        .into_iter()
        .filter_map(|(item, embedding)| embedding.map(|e| (item, cosine(query, e))))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

/// Number of histogram buckets used for the entropy estimate.
const ENTROPY_BINS: usize = 10;

/// Normalised Shannon entropy of a salience distribution.
///
/// Values are bucketed into 10 equal bins over [0, 1] (last bin inclusive);
/// H in bits is divided by log2(10) and clamped to [0, 1]. Empty input
/// yields 0. Used as an observability signal for how uniformly memory
/// strength is distributed.
pub fn entropy(salience_values: &[f64]) -> f64 {
    if salience_values.is_empty() {
        return 0.0;
    }

    let mut counts = [0usize; ENTROPY_BINS];
    for &s in salience_values {
        let clamped = s.clamp(0.0, 1.0);
        let bin = ((clamped * ENTROPY_BINS as f64) as usize).min(ENTROPY_BINS - 1);
        counts[bin] += 1;
    }

    let total = salience_values.len() as f64;
    let mut h = 0.0f64;
    for &count in &counts {
        if count > 0 {
            let p = count as f64 / total;
            h -= p * p.log2();
        }
    }

    (h / (ENTROPY_BINS as f64).log2()).clamp(0.0, 1.0)
}
