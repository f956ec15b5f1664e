//! Pulls answers out of generated text.
//!
//! Generators echo the prompt, so when the prompt itself ends with the marker the
//! answer starts right where the prompt ends, and marker text inside user input is
//! never mistaken for the boundary. Otherwise the first marker occurrence wins.
//! Whenever the marker is missing the raw generated text is returned unchanged.

use tracing::debug;

use crate::{
    prompt::{ARROW_MARKER, RIDDLE_MARKER, SOLUTION_MARKER},
    tasks::{EmojiExample, ExtractedAnswer, RiddleExample},
};

/// Trimmed first line of `text`.
pub fn first_line(text: &str) -> &str {
    text.trim().lines().next().unwrap_or_default().trim_end()
}

/// Text following the answer boundary, or `None` when the marker is absent.
pub fn continuation<'a>(prompt: &str, generated: &'a str, marker: &str) -> Option<&'a str> {
    match generated.strip_prefix(prompt) {
        Some(rest) if prompt.trim_end().ends_with(marker) => Some(rest),
        Some(rest) => rest.split_once(marker).map(|(_, after)| after),
        None => generated.split_once(marker).map(|(_, after)| after),
    }
}

pub fn extract_answer(prompt: &str, generated: &str, marker: &str) -> String {
    match continuation(prompt, generated, marker) {
        Some(rest) => first_line(rest).to_string(),
        None => {
            debug!(marker, "marker missing from generated text, returning it raw");
            generated.to_string()
        }
    }
}

/// Extracts a correction for `original`, restoring its left-hand side when the
/// model answered with a bare value.
pub fn meme_answer(original: &str, prompt: &str, generated: &str, marker: &str) -> ExtractedAnswer {
    let lhs = original.split('=').next().unwrap_or(original).trim();
    let after = match continuation(prompt, generated, marker) {
        Some(rest) => {
            let correction = first_line(rest);
            if correction.is_empty() || correction.contains('=') {
                correction.to_string()
            } else {
                format!("{lhs} = {correction}")
            }
        }
        None => {
            debug!(marker, "marker missing from meme correction, returning it raw");
            generated.to_string()
        }
    };
    ExtractedAnswer {
        before: Some(original.to_string()),
        after,
    }
}

/// Splits a generated `Riddle: ... Solution: ...` block.
pub fn riddle_example(prompt: &str, generated: &str) -> RiddleExample {
    let body = generated
        .strip_prefix(prompt)
        .or_else(|| generated.trim_start().strip_prefix(RIDDLE_MARKER))
        .unwrap_or(generated);

    match body.split_once(SOLUTION_MARKER) {
        Some((riddle, solution)) => {
            let solution = first_line(solution);
            RiddleExample {
                riddle: riddle.trim().to_string(),
                solution: (!solution.is_empty()).then(|| solution.to_string()),
            }
        }
        None => {
            debug!("generated riddle has no solution marker, returning it raw");
            RiddleExample {
                riddle: generated.to_string(),
                solution: None,
            }
        }
    }
}

/// Splits the first generated line of an emoji puzzle on the arrow.
pub fn emoji_example(generated: &str) -> EmojiExample {
    match first_line(generated).split_once(ARROW_MARKER) {
        Some((problem, solution)) => {
            let solution = solution.trim();
            EmojiExample {
                problem: problem.trim().to_string(),
                solution: (!solution.is_empty()).then(|| solution.to_string()),
            }
        }
        None => {
            debug!("generated emoji puzzle has no arrow, returning it raw");
            EmojiExample {
                problem: generated.to_string(),
                solution: None,
            }
        }
    }
}
