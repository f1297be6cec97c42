// src/services/generator.rs

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Course, Lesson, QuestionGenerator, ServiceError};
use crate::models::question::{GeneratedQuestion, Question};

/// Request body sent to the question service.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    course_id: &'a str,
    course_name: &'a str,
    lessons: &'a [Lesson],
    count: usize,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    questions: Vec<GeneratedQuestion>,
}

/// Calls the external text-generation service over HTTP.
pub struct HttpQuestionGenerator {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpQuestionGenerator {
    pub fn new(endpoint: Url, api_key: Option<String>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl QuestionGenerator for HttpQuestionGenerator {
    async fn generate(
        &self,
        course: &Course,
        lessons: &[Lesson],
        count: usize,
    ) -> Result<Vec<Question>, ServiceError> {
        let body = GenerateRequest {
            course_id: &course.id,
            course_name: &course.name,
            lessons,
            count,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let payload: GenerateResponse = response.json().await?;

        tracing::debug!(
            "Question service returned {} questions for course {}",
            payload.questions.len(),
            course.id
        );

        into_questions(payload.questions, &course.id, count)
    }
}

/// Serves questions from a fixed bank, in order.
#[derive(Debug, Default)]
pub struct StaticQuestionGenerator {
    questions: Vec<Question>,
}

impl StaticQuestionGenerator {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    /// Loads a JSON array in the generator's wire format.
    pub fn from_file(path: &str) -> Result<Self, ServiceError> {
        let raw = std::fs::read_to_string(path)?;
        let bank: Vec<GeneratedQuestion> = serde_json::from_str(&raw)?;
        let total = bank.len();
        let questions = into_questions(bank, "bank", total)?;
        tracing::info!("Loaded {} questions from {}", questions.len(), path);
        Ok(Self { questions })
    }
}

#[async_trait]
impl QuestionGenerator for StaticQuestionGenerator {
    async fn generate(
        &self,
        _course: &Course,
        _lessons: &[Lesson],
        count: usize,
    ) -> Result<Vec<Question>, ServiceError> {
        if self.questions.len() < count {
            return Err(ServiceError::InvalidPayload(format!(
                "question bank holds {} questions, {} needed",
                self.questions.len(),
                count
            )));
        }
        Ok(self.questions[..count].to_vec())
    }
}

/// Validates generated questions and keeps the first `count`.
fn into_questions(
    generated: Vec<GeneratedQuestion>,
    id_prefix: &str,
    count: usize,
) -> Result<Vec<Question>, ServiceError> {
    if generated.len() < count {
        return Err(ServiceError::InvalidPayload(format!(
            "expected {} questions, got {}",
            count,
            generated.len()
        )));
    }

    generated
        .into_iter()
        .take(count)
        .enumerate()
        .map(|(i, q)| {
            q.into_question(format!("{}-q{}", id_prefix, i + 1))
                .map_err(|e| ServiceError::InvalidPayload(e.to_string()))
        })
        .collect()
}
