pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine similarity given precomputed norms. Zero-norm inputs score 0.
pub fn cosine_with_norms(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    let denom = a_norm * b_norm;
    if denom <= f32::EPSILON {
        return 0.0;
    }
    dot(a, b) / denom
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_norms(a, l2_norm(a), b, l2_norm(b))
}
