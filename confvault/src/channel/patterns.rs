//! Prompt pattern compilation.

use regex::bytes::Regex;

/// Combine per-mode prompt patterns into one alternation.
///
/// Every pattern must be followed by nothing but whitespace up to the end of
/// the buffer. A multi-line `$` alone would also match a prompt-looking line in
/// the middle of a config dump.
pub fn combine_prompt_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Regex, regex::Error> {
    let alternation = patterns
        .iter()
        .map(|p| format!("(?:{})\\s*\\z", p.as_ref()))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&alternation)
}
