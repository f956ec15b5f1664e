use std::cmp::Ordering;

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::model::GenerationOptions;

/// Picks the next token id from a row of logits.
pub struct Sampler {
    rng: StdRng,
}

impl Sampler {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Returns `None` only for an empty vocabulary.
    pub fn next_token(&mut self, logits: &[f32], options: &GenerationOptions) -> Option<usize> {
        if logits.is_empty() {
            return None;
        }
        if !options.is_sampling() {
            return argmax(logits);
        }

        let temperature = options.temperature as f32;
        let mut candidates: Vec<(usize, f32)> = logits
            .iter()
            .enumerate()
            .filter(|(_, logit)| logit.is_finite())
            .map(|(idx, &logit)| (idx, logit / temperature))
            .collect();
        if candidates.is_empty() {
            return argmax(logits);
        }
        candidates.sort_unstable_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        candidates.truncate(options.top_k.max(1));

        let max = candidates[0].1;
        let mut probs: Vec<(usize, f64)> = candidates
            .iter()
            .map(|&(idx, logit)| (idx, f64::from(logit - max).exp()))
            .collect();
        let total: f64 = probs.iter().map(|(_, p)| p).sum();
        for (_, p) in probs.iter_mut() {
            *p /= total;
        }

        // nucleus: smallest prefix reaching top_p, at least one token
        let mut cumulative = 0.0;
        let mut keep = probs.len();
        for (pos, (_, p)) in probs.iter().enumerate() {
            cumulative += p;
            if cumulative >= options.top_p {
                keep = pos + 1;
                break;
            }
        }
        probs.truncate(keep);

        let mass: f64 = probs.iter().map(|(_, p)| p).sum();
        let mut draw = self.rng.r#gen::<f64>() * mass;
        for &(idx, p) in &probs {
            if draw < p {
                return Some(idx);
            }
            draw -= p;
        }
        probs.last().map(|&(idx, _)| idx)
    }
}

fn argmax(logits: &[f32]) -> Option<usize> {
    logits
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
        .map(|(idx, _)| idx)
}
