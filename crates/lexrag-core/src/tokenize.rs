//! Query and chunk tokenization for lexical scoring.
//!
//! Deliberately light on stop-word removal: legal queries lean on short
//! citation tokens ("статья 355", "§ 12", "№1") that aggressive stop-word
//! lists destroy. Only single-character alphabetic tokens are dropped;
//! digits and the `№`/`§` reference marks always survive.

use std::collections::{BTreeSet, HashSet};

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || c == '№' || c == '§'
}

/// Lowercase and split text into scoring tokens.
///
/// Tokens are maximal runs of alphanumeric characters (plus `№`/`§`);
/// everything else separates. Single-character alphabetic tokens are
/// discarded as connective noise ("и", "в", "a").
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !is_token_char(c))
        .filter(|raw| !raw.is_empty())
        .filter(|raw| {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(only), None) => !only.is_alphabetic(),
                _ => true,
            }
        })
        .map(|raw| raw.to_string())
        .collect()
}

/// Lexical overlap score of a chunk against a set of distinct query tokens.
///
/// `|query ∩ chunk| / |query|`, in `[0.0, 1.0]`. A chunk containing every
/// query token scores 1.0; a chunk containing none scores 0.0. The score
/// is normalized by query size, not chunk length, so long chunks are not
/// rewarded for incidental matches.
pub fn keyword_overlap_score(query_tokens: &BTreeSet<String>, chunk_text: &str) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let chunk_tokens: HashSet<String> = tokenize(chunk_text).into_iter().collect();
    let matched = query_tokens
        .iter()
        .filter(|t| chunk_tokens.contains(t.as_str()))
        .count();
    matched as f64 / query_tokens.len() as f64
}
