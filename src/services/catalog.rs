// src/services/catalog.rs

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;

use super::{Course, CourseCatalog, Lesson, ServiceError};

/// Reads courses and lessons from the platform's Postgres database.
pub struct PgCourseCatalog {
    pool: PgPool,
}

impl PgCourseCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseCatalog for PgCourseCatalog {
    async fn find_course(&self, course_id: &str) -> Result<Option<Course>, ServiceError> {
        let course = sqlx::query_as::<_, Course>("SELECT id, title AS name FROM courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch course {}: {:?}", course_id, e);
                ServiceError::from(e)
            })?;

        Ok(course)
    }

    async fn lessons(&self, course_id: &str) -> Result<Vec<Lesson>, ServiceError> {
        let lessons = sqlx::query_as::<_, Lesson>(
            r#"
            SELECT id, title, content
            FROM lessons
            WHERE course_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch lessons for {}: {:?}", course_id, e);
            ServiceError::from(e)
        })?;

        Ok(lessons)
    }
}

/// Course entry of a catalog file.
#[derive(Debug, Clone, Deserialize)]
pub struct CourseEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

/// Catalog held in memory, for local runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    courses: HashMap<String, CourseEntry>,
}

impl InMemoryCatalog {
    pub fn new(entries: Vec<CourseEntry>) -> Self {
        Self {
            courses: entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }

    /// Loads a JSON array of `{id, name, lessons: [{id, title, content}]}`.
    pub fn from_file(path: &str) -> Result<Self, ServiceError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<CourseEntry> = serde_json::from_str(&raw)?;
        tracing::info!("Loaded {} courses from {}", entries.len(), path);
        Ok(Self::new(entries))
    }

    pub fn with_course(mut self, id: &str, name: &str) -> Self {
        self.courses.insert(
            id.to_string(),
            CourseEntry {
                id: id.to_string(),
                name: name.to_string(),
                lessons: Vec::new(),
            },
        );
        self
    }
}

#[async_trait]
impl CourseCatalog for InMemoryCatalog {
    async fn find_course(&self, course_id: &str) -> Result<Option<Course>, ServiceError> {
        Ok(self.courses.get(course_id).map(|e| Course {
            id: e.id.clone(),
            name: e.name.clone(),
        }))
    }

    async fn lessons(&self, course_id: &str) -> Result<Vec<Lesson>, ServiceError> {
        Ok(self
            .courses
            .get(course_id)
            .map(|e| e.lessons.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_lookup() {
        let catalog = InMemoryCatalog::default().with_course("rust-101", "Rust 101");
        let course = catalog.find_course("rust-101").await.unwrap().unwrap();
        assert_eq!(course.name, "Rust 101");
        assert!(catalog.find_course("go-101").await.unwrap().is_none());
        assert!(catalog.lessons("rust-101").await.unwrap().is_empty());
    }
}
