//! Approximate token estimation for context windowing.
//!
//! The estimate drives windowing and summarization thresholds only; it is
//! not a real tokenizer and must never be used for billing.

/// Estimates the token count of a piece of text.
///
/// Letters weigh a quarter token, other ASCII half a token, and everything
/// else (CJK and other multibyte scripts) a token and a half. The result
/// is rounded up.
pub fn estimate_tokens(input: &str) -> usize {
    let mut estimate = 0.0f64;

    for c in input.chars() {
        if c.is_ascii() {
            if c.is_ascii_alphabetic() {
                estimate += 0.25;
            } else {
                estimate += 0.5;
            }
        } else {
            estimate += 1.5;
        }
    }

    estimate.ceil() as usize
}
