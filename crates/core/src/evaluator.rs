//! Rubric scoring of a transcribed answer by a language model.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
    error::EvaluationError,
    provider::{ApiDialect, Provider},
    questions::InterviewQuestion,
    types::EvaluationResult,
};

pub const MAX_SCORE: i64 = 4;

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        question: &InterviewQuestion,
        transcript: &str,
    ) -> Result<EvaluationResult, EvaluationError>;
}

/// Build the scoring prompt for one question and answer.
pub fn build_prompt(question: &InterviewQuestion, transcript: &str) -> String {
    let rubric: serde_json::Map<String, Value> = question
        .rubric
        .iter()
        .map(|(score, text)| (score.to_string(), Value::String(text.clone())))
        .collect();
    let rubric = serde_json::to_string_pretty(&rubric).unwrap_or_else(|_| "{}".to_string());

    format!(
        r#"You are a strict interview evaluator.

Evaluate the answer ONLY based on RELEVANCE using this rubric:
{rubric}

Question:
{question}

Answer:
{answer}

Choose a score from 0 to 4. Give a short reasoning.

Output JSON ONLY, like:
{{
"score": 3,
"reason": "..."
}}"#,
        rubric = rubric,
        question = question.question_text,
        answer = transcript,
    )
}

#[derive(Debug, Deserialize)]
struct ScoreReply {
    score: Value,
    #[serde(default)]
    reason: String,
}

/// The first `{...}` substring with balanced braces, ignoring braces that
/// appear inside JSON strings.
fn first_balanced_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn score_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a model reply into `(score, reason)`.
///
/// Tries the whole reply as JSON first, then exactly once more on the first
/// balanced object inside it. Anything else is a typed failure.
pub fn parse_score_reply(raw: &str) -> Result<(u8, String), EvaluationError> {
    let trimmed = raw.trim();
    let reply = match serde_json::from_str::<ScoreReply>(trimmed) {
        Ok(reply) => reply,
        Err(strict) => {
            debug!(error = %strict, "reply is not bare JSON, extracting object");
            first_balanced_object(trimmed)
                .and_then(|candidate| serde_json::from_str::<ScoreReply>(candidate).ok())
                .ok_or_else(|| EvaluationError::InvalidReply {
                    raw: raw.to_string(),
                })?
        }
    };

    let score = score_value(&reply.score).ok_or_else(|| EvaluationError::InvalidReply {
        raw: raw.to_string(),
    })?;
    if !(0..=MAX_SCORE).contains(&score) {
        return Err(EvaluationError::ScoreOutOfRange(score));
    }
    Ok((score as u8, reply.reason.trim().to_string()))
}

/// Stand-in for runs started with evaluation turned off. Never consulted by
/// the pipeline in that mode; refuses if it is.
pub struct DisabledEvaluator;

#[async_trait]
impl Evaluator for DisabledEvaluator {
    async fn evaluate(
        &self,
        _question: &InterviewQuestion,
        _transcript: &str,
    ) -> Result<EvaluationResult, EvaluationError> {
        Err(EvaluationError::Disabled)
    }
}

/// Scores answers through Ollama or an OpenAI-compatible chat endpoint.
pub struct LlmEvaluator {
    http: reqwest::Client,
    provider: Provider,
    api_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl LlmEvaluator {
    pub fn new(provider: Provider) -> Result<Self, EvaluationError> {
        let config = provider.config();
        let api_key = provider.validate_api_key()?;
        Ok(Self {
            http: reqwest::Client::new(),
            provider,
            api_url: config.api_url.to_string(),
            model: config.model.to_string(),
            api_key,
            temperature: 0.0,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn request_body(&self, prompt: &str) -> Value {
        match self.provider.config().dialect {
            ApiDialect::OllamaGenerate => json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "options": { "temperature": self.temperature },
            }),
            ApiDialect::ChatCompletions => json!({
                "model": self.model,
                "messages": [
                    { "role": "user", "content": prompt },
                ],
                "temperature": self.temperature,
            }),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, EvaluationError> {
        let mut request = self
            .http
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        let content = match self.provider.config().dialect {
            ApiDialect::OllamaGenerate => response["response"].as_str(),
            ApiDialect::ChatCompletions => response["choices"][0]["message"]["content"].as_str(),
        }
        .map(str::to_string);
        match content {
            Some(text) => Ok(text),
            None => Err(EvaluationError::InvalidApiResponse(response)),
        }
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(
        &self,
        question: &InterviewQuestion,
        transcript: &str,
    ) -> Result<EvaluationResult, EvaluationError> {
        if question.rubric.is_empty() {
            warn!(
                question_id = question.question_id,
                "question has no rubric, scoring without criteria"
            );
        }

        let prompt = build_prompt(question, transcript);
        let raw = self.complete(&prompt).await?;
        let (score, reason) = parse_score_reply(&raw)?;

        debug!(
            question_id = question.question_id,
            provider = self.provider.name(),
            score,
            "answer scored"
        );
        Ok(EvaluationResult {
            question_id: question.question_id,
            score,
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::questions::Rubric;

    #[test]
    fn strict_json_reply() {
        let (score, reason) = parse_score_reply(r#"{"score": 3, "reason": "on topic"}"#).unwrap();
        assert_eq!(score, 3);
        assert_eq!(reason, "on topic");
    }

    #[test]
    fn repairs_reply_wrapped_in_prose() {
        let raw = "Sure! Here is my evaluation:\n```json\n{\"score\": 2, \"reason\": \"uses {braces} in text\"}\n```\nHope it helps {really}.";
        let (score, reason) = parse_score_reply(raw).unwrap();
        assert_eq!(score, 2);
        assert_eq!(reason, "uses {braces} in text");
    }

    #[test]
    fn string_and_float_scores_are_accepted() {
        assert_eq!(parse_score_reply(r#"{"score": "4", "reason": ""}"#).unwrap().0, 4);
        assert_eq!(parse_score_reply(r#"{"score": 1.0, "reason": ""}"#).unwrap().0, 1);
    }

    #[test]
    fn unparseable_reply_fails_loudly() {
        let err = parse_score_reply("I would give this a three.").unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidReply { .. }));

        let err = parse_score_reply(r#"{"score": "three"}"#).unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidReply { .. }));

        let err = parse_score_reply(r#"{"reason": "no score"}"#).unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidReply { .. }));
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        let err = parse_score_reply(r#"{"score": 7, "reason": "generous"}"#).unwrap_err();
        assert!(matches!(err, EvaluationError::ScoreOutOfRange(7)));
        let err = parse_score_reply(r#"{"score": -1, "reason": ""}"#).unwrap_err();
        assert!(matches!(err, EvaluationError::ScoreOutOfRange(-1)));
    }

    #[test]
    fn balanced_object_ignores_braces_in_strings() {
        let raw = r#"x {"a": "}{", "b": {"c": 1}} y }"#;
        assert_eq!(
            first_balanced_object(raw),
            Some(r#"{"a": "}{", "b": {"c": 1}}"#)
        );
        assert_eq!(first_balanced_object("{ never closed"), None);
        assert_eq!(first_balanced_object("no braces"), None);
    }

    #[test]
    fn prompt_contains_rubric_question_and_answer() {
        let question = InterviewQuestion {
            question_id: 1,
            question_text: "What was hard?".to_string(),
            rubric: Rubric::from([(4, "Comprehensive".to_string()), (0, "Unanswered".to_string())]),
        };
        let prompt = build_prompt(&question, "The data pipeline.");
        assert!(prompt.contains("\"4\": \"Comprehensive\""));
        assert!(prompt.contains("Question:\nWhat was hard?"));
        assert!(prompt.contains("Answer:\nThe data pipeline."));
        assert!(prompt.contains("\"score\": 3"));
    }

    #[test]
    fn request_body_matches_dialect() {
        let evaluator = LlmEvaluator::new(Provider::Ollama).unwrap();
        let body = evaluator.request_body("hi");
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], false);
        assert_eq!(body["prompt"], "hi");
    }
}
