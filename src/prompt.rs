//! Prompt templates for each task. User text is embedded verbatim.

use rand::{Rng, seq::SliceRandom};

use crate::error::ServiceError;

pub const RIDDLE_MARKER: &str = "Riddle:";
pub const SOLUTION_MARKER: &str = "Solution:";
pub const INCORRECT_MARKER: &str = "Incorrect:";
pub const CORRECT_MARKER: &str = "Correct:";
pub const ARROW_MARKER: &str = "→";

/// Classic wrong answers used to seed the random meme examples.
pub const MEME_CATALOGUE: &[&str] = &[
    "2 + 2 × 2 = 8",
    "8 ÷ 2(2 + 2) = 1",
    "6 ÷ 2 × 3 = 1",
    "3 - 3 × 6 + 2 = -16",
    "1 + 1 × 0 = 0",
    "10 - 5 + 5 = 0",
    "2³ = 6",
    "9 - 3 ÷ 3 + 1 = 3",
    "5 + 5 × 5 = 50",
    "100 ÷ 10 × 10 = 1",
];

pub const EMOJI_PALETTE: &[&str] = &["🍎", "🍌", "🍇", "🍓", "🍕", "🐱", "⭐", "🚗"];

const EMOJI_OPERATORS: &[&str] = &["+", "-", "×"];

pub fn riddle_generation() -> String {
    RIDDLE_MARKER.to_string()
}

pub fn riddle_solving(riddle: &str) -> Result<String, ServiceError> {
    let riddle = non_empty(riddle, "riddle")?;
    Ok(format!("{RIDDLE_MARKER} {riddle}\n{SOLUTION_MARKER}"))
}

/// Trims the statement and turns a bare expression into an equation to fix.
pub fn normalize_meme(meme: &str) -> Result<String, ServiceError> {
    let meme = non_empty(meme, "meme")?;
    if meme.contains('=') {
        Ok(meme.to_string())
    } else {
        Ok(format!("{meme} = ?"))
    }
}

/// Expects a statement already passed through [`normalize_meme`].
pub fn meme_repair(meme: &str) -> String {
    format!("{INCORRECT_MARKER} {meme}\n{CORRECT_MARKER}")
}

/// Doubles as the prompt: the model continues after the arrow.
pub fn emoji_solving(problem: &str) -> Result<String, ServiceError> {
    let problem = non_empty(problem, "problem")?;
    if problem.contains(ARROW_MARKER) {
        Ok(problem.to_string())
    } else {
        Ok(format!("{problem} {ARROW_MARKER}"))
    }
}

/// An opening such as `"🍎 + 🍌 ="` for the model to finish into a full puzzle.
pub fn emoji_generation<R: Rng + ?Sized>(rng: &mut R) -> String {
    let left = EMOJI_PALETTE.choose(rng).copied().unwrap_or("🍎");
    let right = EMOJI_PALETTE.choose(rng).copied().unwrap_or("🍎");
    let op = EMOJI_OPERATORS.choose(rng).copied().unwrap_or("+");
    format!("{left} {op} {right} =")
}

pub fn random_meme<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    MEME_CATALOGUE.choose(rng).copied().unwrap_or(MEME_CATALOGUE[0])
}

fn non_empty<'a>(text: &'a str, field: &str) -> Result<&'a str, ServiceError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn riddle_prompts() {
        assert_eq!(riddle_generation(), "Riddle:");
        assert_eq!(
            riddle_solving("  What has a face and two hands?\n").unwrap(),
            "Riddle: What has a face and two hands?\nSolution:"
        );
    }

    #[test]
    fn blank_input_is_rejected() {
        assert!(matches!(riddle_solving("   "), Err(ServiceError::BadRequest(_))));
        assert!(normalize_meme("\n").is_err());
        assert!(emoji_solving("").is_err());
    }

    #[test]
    fn meme_without_equals_gets_placeholder() {
        assert_eq!(normalize_meme("2 + 2 × 2").unwrap(), "2 + 2 × 2 = ?");
    }

    #[test]
    fn meme_with_equals_is_untouched() {
        let meme = normalize_meme(" 2 + 2 × 2 = 8 ").unwrap();
        assert_eq!(meme, "2 + 2 × 2 = 8");
        assert_eq!(meme.matches('=').count(), 1);
        assert_eq!(meme_repair(&meme), "Incorrect: 2 + 2 × 2 = 8\nCorrect:");
    }

    #[test]
    fn emoji_problem_gets_arrow() {
        assert_eq!(emoji_solving("🍎 + 🍎 = 4").unwrap(), "🍎 + 🍎 = 4 →");
        assert_eq!(emoji_solving("🍎 + 🍎 = 4 →").unwrap(), "🍎 + 🍎 = 4 →");
    }

    #[test]
    fn random_seeds_come_from_the_catalogues() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            assert!(MEME_CATALOGUE.contains(&random_meme(&mut rng)));
            let seed = emoji_generation(&mut rng);
            assert!(seed.ends_with(" ="));
            let parts: Vec<&str> = seed.split_whitespace().collect();
            assert_eq!(parts.len(), 4);
            assert!(EMOJI_PALETTE.contains(&parts[2]));
            assert!(!seed.contains(ARROW_MARKER));
            assert!(EMOJI_PALETTE.iter().any(|emoji| seed.starts_with(emoji)));
        }
    }
}
