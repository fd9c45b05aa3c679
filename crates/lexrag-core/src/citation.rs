//! Citation label parsing over untrusted model output.
//!
//! Model text is the most failure-prone boundary in the pipeline, so
//! label extraction is isolated behind a deliberately narrow grammar:
//! a label is `[` followed by one to three ASCII digits followed by `]`,
//! nothing else. `[12a]`, `[ 3 ]`, and bracketed prose never match.
//!
//! [`sanitize_citations`] removes labels that are not in the known set
//! (the labels actually handed to the model) and reports them, so a
//! hallucinated citation can never survive into the returned answer.

use std::collections::BTreeSet;

/// A citation label found in answer text, with its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelToken {
    pub label: usize,
    pub start: usize,
    pub end: usize,
}

/// Scan text for citation labels.
///
/// The scanner works on bytes; `[` and digits are ASCII, so every token
/// span lies on char boundaries.
pub fn extract_labels(text: &str) -> Vec<LabelToken> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'[' {
            i += 1;
            continue;
        }
        let digits_start = i + 1;
        let mut j = digits_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() && j - digits_start < 3 {
            j += 1;
        }
        let is_label = j > digits_start && bytes.get(j) == Some(&b']');
        if !is_label {
            i += 1;
            continue;
        }
        // At most 3 digits: the parse cannot overflow usize.
        let label: usize = text[digits_start..j].parse().unwrap_or(0);
        tokens.push(LabelToken {
            label,
            start: i,
            end: j + 1,
        });
        i = j + 1;
    }

    tokens
}

/// Result of validating an answer's citation labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedAnswer {
    /// Answer text with unknown labels removed.
    pub text: String,
    /// Distinct known labels the answer cites, ascending.
    pub cited: Vec<usize>,
    /// Distinct labels that were stripped (grounding violations),
    /// ascending.
    pub stripped: Vec<usize>,
}

/// Strip labels outside `known` from `text`, collecting both the labels
/// kept and the labels removed.
pub fn sanitize_citations(text: &str, known: &BTreeSet<usize>) -> SanitizedAnswer {
    let tokens = extract_labels(text);
    let mut out = String::with_capacity(text.len());
    let mut cited = BTreeSet::new();
    let mut stripped = BTreeSet::new();
    let mut cursor = 0;

    for token in &tokens {
        out.push_str(&text[cursor..token.start]);
        if known.contains(&token.label) {
            out.push_str(&text[token.start..token.end]);
            cited.insert(token.label);
        } else {
            stripped.insert(token.label);
        }
        cursor = token.end;
    }
    out.push_str(&text[cursor..]);

    SanitizedAnswer {
        text: out,
        cited: cited.into_iter().collect(),
        stripped: stripped.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(labels: &[usize]) -> BTreeSet<usize> {
        labels.iter().copied().collect()
    }

    #[test]
    fn extracts_simple_labels() {
        let tokens = extract_labels("Ставка 5% [1], льгота отменена [2].");
        let labels: Vec<usize> = tokens.iter().map(|t| t.label).collect();
        assert_eq!(labels, vec![1, 2]);
    }

    #[test]
    fn grammar_rejects_non_labels() {
        assert!(extract_labels("[abc] [ 1 ] [] [1a] [1234]").is_empty());
    }

    #[test]
    fn spans_slice_back_to_token_text() {
        let text = "см. [12] и далее";
        let tokens = extract_labels(text);
        assert_eq!(tokens.len(), 1);
        assert_eq!(&text[tokens[0].start..tokens[0].end], "[12]");
    }

    #[test]
    fn adjacent_labels() {
        let labels: Vec<usize> = extract_labels("[1][2][3]").iter().map(|t| t.label).collect();
        assert_eq!(labels, vec![1, 2, 3]);
    }

    #[test]
    fn keeps_known_strips_unknown() {
        let result = sanitize_citations("Налог уплачивается [1], см. также [7].", &known(&[1, 2]));
        assert_eq!(result.text, "Налог уплачивается [1], см. также .");
        assert_eq!(result.cited, vec![1]);
        assert_eq!(result.stripped, vec![7]);
    }

    #[test]
    fn repeated_labels_reported_once() {
        let result = sanitize_citations("[3] и [3] и [3]", &known(&[1]));
        assert_eq!(result.cited, Vec::<usize>::new());
        assert_eq!(result.stripped, vec![3]);
        assert_eq!(result.text, " и  и ");
    }

    #[test]
    fn label_zero_is_never_known() {
        let result = sanitize_citations("см. [0]", &known(&[1, 2]));
        assert_eq!(result.stripped, vec![0]);
    }

    #[test]
    fn text_without_labels_passes_through() {
        let result = sanitize_citations("Ответ без ссылок.", &known(&[1]));
        assert_eq!(result.text, "Ответ без ссылок.");
        assert!(result.cited.is_empty());
        assert!(result.stripped.is_empty());
    }

    #[test]
    fn multibyte_text_around_labels() {
        let result = sanitize_citations("Статья 355 Кодекса [2] § применяется", &known(&[2]));
        assert_eq!(result.text, "Статья 355 Кодекса [2] § применяется");
        assert_eq!(result.cited, vec![2]);
    }
}
