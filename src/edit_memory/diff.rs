//! Sentence-level change detection between an original and an edited body.
//!
//! Sentences are compared by position. An inserted sentence in the middle of
//! a body therefore shifts every later index and each of them reports as
//! changed. The downstream memory payload relies on these index semantics, so
//! the comparison stays positional.

use serde::{Deserialize, Serialize};

use crate::config::MAX_MEMORY_DELTAS;
use crate::models::RequirementSet;

/// One sentence that differs between the two bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceDelta {
    pub original_sentence: String,
    pub edited_sentence: String,
    pub sentence_index: usize,
}

/// Requirement counts sent alongside an edit so the memory store knows what
/// the response was answering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsContext {
    pub solution_requirements_count: usize,
    pub response_structure_requirements_count: usize,
    pub summary: String,
}

impl RequirementsContext {
    pub fn from_set(set: &RequirementSet) -> Self {
        let solution = set.solution_requirements.len();
        let structure = set.response_structure_requirements.len();
        Self {
            solution_requirements_count: solution,
            response_structure_requirements_count: structure,
            summary: format!(
                "{solution} solution requirements, {structure} response structure requirements"
            ),
        }
    }
}

/// Payload handed to the memory store after a response edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditMemoryPayload {
    pub changed_sentences: Vec<SentenceDelta>,
    pub requirements_context: Option<RequirementsContext>,
}

impl EditMemoryPayload {
    /// `None` when the edit changed nothing.
    pub fn from_edit(
        original: &str,
        edited: &str,
        requirements: Option<&RequirementSet>,
    ) -> Option<Self> {
        let changed_sentences = extract_sentence_deltas(original, edited);
        if changed_sentences.is_empty() {
            return None;
        }
        Some(Self {
            changed_sentences,
            requirements_context: requirements.map(RequirementsContext::from_set),
        })
    }
}

/// Split on `.`, `!` or `?` followed by whitespace. The punctuation stays with
/// its sentence; blank pieces are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next_idx, next)) = chars.peek() {
            if next.is_whitespace() {
                push_sentence(&mut sentences, &text[start..next_idx]);
                start = next_idx;
            }
        }
    }
    push_sentence(&mut sentences, &text[start..]);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, piece: &str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        sentences.push(piece.to_string());
    }
}

fn collapse_whitespace(sentence: &str) -> String {
    sentence.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Index-aligned sentence deltas, at most [`MAX_MEMORY_DELTAS`].
pub fn extract_sentence_deltas(original: &str, edited: &str) -> Vec<SentenceDelta> {
    if original.trim() == edited.trim() {
        return Vec::new();
    }

    let before = split_sentences(original);
    let after = split_sentences(edited);
    let longest = before.len().max(after.len());

    let mut deltas = Vec::new();
    for index in 0..longest {
        let old = before.get(index).map(String::as_str).unwrap_or_default();
        let new = after.get(index).map(String::as_str).unwrap_or_default();
        if collapse_whitespace(old) == collapse_whitespace(new) {
            continue;
        }
        deltas.push(SentenceDelta {
            original_sentence: old.to_string(),
            edited_sentence: new.to_string(),
            sentence_index: index,
        });
        if deltas.len() == MAX_MEMORY_DELTAS {
            tracing::debug!(
                sentences = longest,
                "Sentence delta cap reached, dropping the rest"
            );
            break;
        }
    }
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequirementItem;

    #[test]
    fn identical_bodies_yield_nothing() {
        assert!(extract_sentence_deltas("A. B. C.", "A. B. C.").is_empty());
        assert!(extract_sentence_deltas("  A. B.\n", "A. B.").is_empty());
    }

    #[test]
    fn detects_single_changed_sentence() {
        let deltas = extract_sentence_deltas(
            "The sky is blue. Water is wet.",
            "The sky is green. Water is wet.",
        );
        assert_eq!(
            deltas,
            vec![SentenceDelta {
                original_sentence: "The sky is blue.".into(),
                edited_sentence: "The sky is green.".into(),
                sentence_index: 0,
            }]
        );
    }

    #[test]
    fn whitespace_only_changes_inside_sentences_are_ignored() {
        let deltas = extract_sentence_deltas("One  two. Three.", "One two.\nThree. Four!");
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].sentence_index, 2);
        assert_eq!(deltas[0].original_sentence, "");
        assert_eq!(deltas[0].edited_sentence, "Four!");
    }

    #[test]
    fn removed_tail_is_a_deletion() {
        let deltas = extract_sentence_deltas("Keep. Drop? Gone.", "Keep.");
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].original_sentence, "Drop?");
        assert_eq!(deltas[0].edited_sentence, "");
        assert_eq!(deltas[1].sentence_index, 2);
    }

    #[test]
    fn mid_body_insertion_shifts_later_indices() {
        let deltas = extract_sentence_deltas("A. B. C.", "A. New. B. C.");
        let indices: Vec<usize> = deltas.iter().map(|d| d.sentence_index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn deltas_are_capped() {
        let original: String = (0..80).map(|i| format!("Sentence {i}. ")).collect();
        let edited: String = (0..80).map(|i| format!("Changed {i}. ")).collect();
        let deltas = extract_sentence_deltas(&original, &edited);
        assert_eq!(deltas.len(), MAX_MEMORY_DELTAS);
        assert_eq!(deltas.last().unwrap().sentence_index, MAX_MEMORY_DELTAS - 1);
    }

    #[test]
    fn split_keeps_punctuation_and_decimals() {
        assert_eq!(
            split_sentences("Version 2.5 ships now. Really?  Yes!\n\nDone"),
            vec!["Version 2.5 ships now.", "Really?", "Yes!", "Done"]
        );
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn payload_is_none_for_unchanged_edit() {
        assert!(EditMemoryPayload::from_edit("Same.", "Same.", None).is_none());
    }

    #[test]
    fn payload_carries_requirement_counts() {
        let set = RequirementSet {
            solution_requirements: vec![
                RequirementItem::new("SOL-1", "General", "a"),
                RequirementItem::new("SOL-2", "General", "b"),
            ],
            ..Default::default()
        };
        let payload = EditMemoryPayload::from_edit("Old.", "New.", Some(&set)).unwrap();
        let context = payload.requirements_context.unwrap();
        assert_eq!(context.solution_requirements_count, 2);
        assert_eq!(context.response_structure_requirements_count, 0);
        assert_eq!(payload.changed_sentences.len(), 1);
    }
}
