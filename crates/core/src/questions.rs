//! Read-only question dataset: question text and scoring rubric per id.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::QuestionSetError;

/// Scoring criteria keyed by score (0..=4).
pub type Rubric = BTreeMap<u8, String>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterviewQuestion {
    pub question_id: u32,
    pub question_text: String,
    pub rubric: Rubric,
}

#[derive(Debug, Deserialize)]
struct Payload {
    data: PayloadData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayloadData {
    review_checklists: ReviewChecklists,
}

#[derive(Debug, Deserialize)]
struct ReviewChecklists {
    #[serde(default)]
    interviews: Vec<InterviewEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InterviewEntry {
    position_id: u32,
    question: String,
    #[serde(default)]
    rubric: Option<HashMap<String, String>>,
}

/// Every question known to a run. Loaded once, shared read-only.
#[derive(Debug, Clone, Default)]
pub struct QuestionSet {
    questions: BTreeMap<u32, InterviewQuestion>,
}

fn parse_rubric(
    question_id: &str,
    raw: HashMap<String, String>,
) -> Result<Rubric, QuestionSetError> {
    raw.into_iter()
        .map(|(score, text)| {
            let parsed = score
                .trim()
                .parse::<u8>()
                .ok()
                .filter(|s| *s <= 4)
                .ok_or_else(|| QuestionSetError::InvalidRubric {
                    question_id: question_id.to_string(),
                    reason: format!("score key {score:?} is not an integer in 0..=4"),
                })?;
            Ok((parsed, text))
        })
        .collect()
}

impl QuestionSet {
    /// Load the interview payload and, optionally, a separate rubric file
    /// shaped `{"<question id>": {"<score>": "<criteria>"}}`.
    ///
    /// A rubric in the separate file replaces one given inline.
    pub fn load(payload_path: &Path, rubric_path: Option<&Path>) -> Result<Self, QuestionSetError> {
        let payload: Payload = read_json(payload_path)?;
        let mut set = Self::from_entries(payload.data.review_checklists.interviews)?;
        if set.is_empty() {
            return Err(QuestionSetError::Empty {
                path: payload_path.to_path_buf(),
            });
        }

        if let Some(rubric_path) = rubric_path {
            let rubrics: HashMap<String, HashMap<String, String>> = read_json(rubric_path)?;
            set.apply_rubrics(rubrics)?;
        }

        info!(
            questions = set.len(),
            with_rubric = set.questions.values().filter(|q| !q.rubric.is_empty()).count(),
            "question set loaded"
        );
        Ok(set)
    }

    fn from_entries(entries: Vec<InterviewEntry>) -> Result<Self, QuestionSetError> {
        let mut questions = BTreeMap::new();
        for entry in entries {
            if questions.contains_key(&entry.position_id) {
                warn!(
                    question_id = entry.position_id,
                    "duplicate question id, keeping the first entry"
                );
                continue;
            }
            let rubric = match entry.rubric {
                Some(raw) => parse_rubric(&entry.position_id.to_string(), raw)?,
                None => Rubric::new(),
            };
            questions.insert(
                entry.position_id,
                InterviewQuestion {
                    question_id: entry.position_id,
                    question_text: entry.question,
                    rubric,
                },
            );
        }
        Ok(Self { questions })
    }

    fn apply_rubrics(
        &mut self,
        rubrics: HashMap<String, HashMap<String, String>>,
    ) -> Result<(), QuestionSetError> {
        for (id, raw) in rubrics {
            let question_id =
                id.trim()
                    .parse::<u32>()
                    .map_err(|_| QuestionSetError::InvalidRubric {
                        question_id: id.clone(),
                        reason: "question id is not an integer".to_string(),
                    })?;
            let rubric = parse_rubric(&id, raw)?;
            match self.questions.get_mut(&question_id) {
                Some(question) => question.rubric = rubric,
                None => warn!(question_id, "rubric for unknown question ignored"),
            }
        }
        Ok(())
    }

    pub fn from_questions(questions: impl IntoIterator<Item = InterviewQuestion>) -> Self {
        let mut set = Self::default();
        for q in questions {
            set.questions.entry(q.question_id).or_insert(q);
        }
        set
    }

    /// Exact id lookup. Absence is a normal outcome.
    pub fn get(&self, question_id: u32) -> Option<&InterviewQuestion> {
        self.questions.get(&question_id)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, QuestionSetError> {
    let content = std::fs::read_to_string(path).map_err(|source| QuestionSetError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| QuestionSetError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
