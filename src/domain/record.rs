// ============================================================
// Layer 3 — Record Domain Type
// ============================================================
// A story-cloze unit: up to four body sentences followed by
// two candidate endings, one of which is the right one.
//
// Example:
//   body:    ["karen was assigned a roommate ...", ...]
//   endings: ["karen became good friends ...",
//             "karen hated her roommate ..."]
//   correct_ending: 1
//
// Every sentence is already tokenised (lower-cased words and
// punctuation). Records are created in bulk when a RecordStore
// loads and are never mutated afterwards.

use serde::{Deserialize, Serialize};

/// Maximum number of body sentences a record may carry.
pub const MAX_BODY_SENTENCES: usize = 4;

/// One tokenised sentence.
pub type Sentence = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier from the source corpus, kept for traceability
    pub story_id: String,

    /// Story body, oldest sentence first
    pub body: Vec<Sentence>,

    /// The two candidate endings, in corpus order
    pub endings: [Sentence; 2],

    /// Which ending is right: 1 or 2
    pub correct_ending: u8,
}

impl Record {
    pub fn new(
        story_id:       impl Into<String>,
        body:           Vec<Sentence>,
        endings:        [Sentence; 2],
        correct_ending: u8,
    ) -> Self {
        Self {
            story_id: story_id.into(),
            body,
            endings,
            correct_ending,
        }
    }

    /// Zero-based index of the correct ending (0 or 1).
    pub fn label(&self) -> usize {
        usize::from(self.correct_ending.saturating_sub(1))
    }

    /// The sentence closest to the endings, used as alignment context.
    /// Empty when the record has no body.
    pub fn last_body_sentence(&self) -> &[String] {
        self.body.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns a description of the first shape violation, if any.
    pub fn shape_violation(&self) -> Option<String> {
        if self.correct_ending != 1 && self.correct_ending != 2 {
            return Some(format!(
                "story '{}': correct ending must be 1 or 2, got {}",
                self.story_id, self.correct_ending
            ));
        }
        if self.body.len() > MAX_BODY_SENTENCES {
            return Some(format!(
                "story '{}': {} body sentences, at most {} allowed",
                self.story_id,
                self.body.len(),
                MAX_BODY_SENTENCES
            ));
        }
        if self.endings.iter().any(Vec::is_empty) {
            return Some(format!("story '{}': empty ending", self.story_id));
        }
        None
    }
}

/// A premise / hypothesis pair from an inference corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentencePair {
    pub premise:    Sentence,
    pub hypothesis: Sentence,
    /// False only when the hypothesis contradicts the premise
    pub entails:    bool,
}

/// Builds a sentence from a whitespace separated string. Handy in tests.
pub fn sentence(text: &str) -> Sentence {
    text.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(correct: u8) -> Record {
        Record::new(
            "s1",
            vec![sentence("tom went out ."), sentence("it rained .")],
            [sentence("he got wet ."), sentence("he was dry .")],
            correct,
        )
    }

    #[test]
    fn test_label_is_zero_based() {
        assert_eq!(story(1).label(), 0);
        assert_eq!(story(2).label(), 1);
    }

    #[test]
    fn test_last_body_sentence() {
        assert_eq!(story(1).last_body_sentence(), sentence("it rained .").as_slice());
        let empty = Record::new("e", vec![], [sentence("a"), sentence("b")], 1);
        assert!(empty.last_body_sentence().is_empty());
    }

    #[test]
    fn test_shape_violations() {
        assert!(story(1).shape_violation().is_none());
        assert!(story(3).shape_violation().is_some());

        let mut long = story(1);
        long.body = vec![sentence("x ."); 5];
        assert!(long.shape_violation().is_some());

        let mut blank = story(2);
        blank.endings[1].clear();
        assert!(blank.shape_violation().is_some());
    }
}
