// src/services/mod.rs

//! Adapters for the collaborators the duel depends on but does not own:
//! the course catalog, the question generator and result storage.

pub mod catalog;
pub mod generator;
pub mod results;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    error::ChallengeError,
    models::{question::Question, result::DuelRecord},
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Course {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    pub content: String,
}

/// Failure of an external collaborator.
#[derive(Debug)]
pub enum ServiceError {
    Database(String),
    Http(String),
    /// The collaborator answered, but with something unusable.
    InvalidPayload(String),
    Io(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Database(msg) => write!(f, "database error: {}", msg),
            ServiceError::Http(msg) => write!(f, "http error: {}", msg),
            ServiceError::InvalidPayload(msg) => write!(f, "invalid payload: {}", msg),
            ServiceError::Io(msg) => write!(f, "io error: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::InvalidPayload(err.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Io(err.to_string())
    }
}

impl From<ServiceError> for ChallengeError {
    fn from(err: ServiceError) -> Self {
        ChallengeError::ServiceUnavailable(err.to_string())
    }
}

/// Course and lesson lookup owned by the course platform.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    async fn find_course(&self, course_id: &str) -> Result<Option<Course>, ServiceError>;

    async fn lessons(&self, course_id: &str) -> Result<Vec<Lesson>, ServiceError>;
}

/// Turns lesson content into multiple-choice questions.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(
        &self,
        course: &Course,
        lessons: &[Lesson],
        count: usize,
    ) -> Result<Vec<Question>, ServiceError>;
}

/// Stores final scores as test results.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, record: &DuelRecord) -> Result<(), ServiceError>;
}

/// The collaborator set handed to the hub.
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn CourseCatalog>,
    pub generator: Arc<dyn QuestionGenerator>,
    pub results: Arc<dyn ResultSink>,
}
