//! Fits prompt tokens into the model context window and sizes the decoding budget.

use crate::error::ServiceError;

/// Prepares encoded prompt ids for decoding. An empty encoding becomes a lone
/// `eos_token_id`; prompts over `context_window` are cut when `truncation` is
/// set and rejected otherwise.
pub fn fit_prompt(
    mut ids: Vec<i64>,
    eos_token_id: i64,
    context_window: usize,
    truncation: bool,
) -> Result<Vec<i64>, ServiceError> {
    if ids.is_empty() {
        ids.push(eos_token_id);
    }
    if ids.len() > context_window {
        if !truncation {
            return Err(ServiceError::BadRequest(format!(
                "prompt is {} tokens, context window is {}",
                ids.len(),
                context_window
            )));
        }
        ids.truncate(context_window);
    }
    Ok(ids)
}

/// Total sequence length decoding may reach, prompt included.
pub fn token_budget(max_length: usize, context_window: usize) -> usize {
    max_length.min(context_window)
}

/// New tokens left once the prompt is in place; zero when the prompt already fills the budget.
pub fn new_token_allowance(prompt_len: usize, budget: usize) -> usize {
    budget.saturating_sub(prompt_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_encoding_starts_from_eos() {
        assert_eq!(fit_prompt(Vec::new(), 50256, 1024, false).unwrap(), vec![50256]);
    }

    #[test]
    fn short_prompt_is_unchanged() {
        let ids = vec![7, 8, 9];
        assert_eq!(fit_prompt(ids.clone(), 0, 4, false).unwrap(), ids);
        assert_eq!(fit_prompt(ids.clone(), 0, 3, false).unwrap(), ids);
    }

    #[test]
    fn long_prompt_is_cut_with_truncation() {
        let ids: Vec<i64> = (0..10).collect();
        assert_eq!(fit_prompt(ids, 0, 4, true).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn long_prompt_is_rejected_without_truncation() {
        let ids: Vec<i64> = (0..10).collect();
        let err = fit_prompt(ids, 0, 4, false).unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(reason) if reason.contains("10 tokens")));
    }

    #[test]
    fn budget_is_capped_by_context_window() {
        assert_eq!(token_budget(50, 1024), 50);
        assert_eq!(token_budget(4096, 1024), 1024);
    }

    #[test]
    fn prompt_at_or_over_max_length_gets_no_new_tokens() {
        let budget = token_budget(50, 1024);
        assert_eq!(new_token_allowance(50, budget), 0);
        assert_eq!(new_token_allowance(80, budget), 0);
        assert_eq!(new_token_allowance(12, budget), 38);
    }
}
