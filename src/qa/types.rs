//! Request and response types for the QA facade.

use serde::{Deserialize, Serialize};

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaResult {
    /// The question as asked.
    pub question: String,
    /// Raw model response.
    pub answer: String,
}

/// A single question or a batch, accepted as a JSON string or array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryInput {
    /// One question.
    Single(String),
    /// Several questions answered concurrently.
    Batch(Vec<String>),
}

impl From<&str> for QueryInput {
    fn from(question: &str) -> Self {
        QueryInput::Single(question.to_string())
    }
}

impl From<String> for QueryInput {
    fn from(question: String) -> Self {
        QueryInput::Single(question)
    }
}

impl From<Vec<String>> for QueryInput {
    fn from(questions: Vec<String>) -> Self {
        QueryInput::Batch(questions)
    }
}

/// Output mirroring the shape of the [`QueryInput`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QaOutput {
    /// Answer to a single question.
    Single(QaResult),
    /// Answers in the order the questions were given.
    Batch(Vec<QaResult>),
}

impl QaOutput {
    /// Flatten into a list of results.
    pub fn into_results(self) -> Vec<QaResult> {
        match self {
            QaOutput::Single(result) => vec![result],
            QaOutput::Batch(results) => results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_input_accepts_string_or_array() {
        let single: QueryInput = serde_json::from_value(json!("What?")).expect("single");
        assert_eq!(single, QueryInput::Single("What?".into()));

        let batch: QueryInput = serde_json::from_value(json!(["a", "b"])).expect("batch");
        assert_eq!(batch, QueryInput::Batch(vec!["a".into(), "b".into()]));

        assert!(serde_json::from_value::<QueryInput>(json!(42)).is_err());
    }

    #[test]
    fn output_serializes_as_object_or_array() {
        let result = QaResult {
            question: "q".into(),
            answer: "a".into(),
        };
        assert_eq!(
            serde_json::to_value(QaOutput::Single(result.clone())).expect("json"),
            json!({ "question": "q", "answer": "a" })
        );
        assert_eq!(
            serde_json::to_value(QaOutput::Batch(vec![result])).expect("json"),
            json!([{ "question": "q", "answer": "a" }])
        );
    }
}
