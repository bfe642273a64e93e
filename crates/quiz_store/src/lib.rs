use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::debug;

use shared::domain::{QuestionDefinition, QuizDefinition, QuizId, QuizSummary};

mod source;

pub use source::{MemoryQuizSource, QuizFetchError, QuizSource};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 8;
pub const MIN_DURATION_MS: u64 = 1_000;
pub const MAX_DURATION_MS: u64 = 300_000;
const MAX_TITLE_CHARS: usize = 200;

/// Quiz definition as submitted for storage, before it has an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuiz {
    pub title: String,
    pub questions: Vec<QuestionDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuizValidationError {
    #[error("quiz title must be between 1 and {MAX_TITLE_CHARS} characters")]
    Title,
    #[error("quiz must contain at least one question")]
    NoQuestions,
    #[error("question {index}: prompt is empty")]
    EmptyPrompt { index: usize },
    #[error("question {index}: expected {MIN_OPTIONS}..={MAX_OPTIONS} options, got {count}")]
    OptionCount { index: usize, count: usize },
    #[error("question {index}: correct index {correct} out of range")]
    CorrectIndex { index: usize, correct: usize },
    #[error("question {index}: duration {duration_ms}ms outside {MIN_DURATION_MS}..={MAX_DURATION_MS}")]
    Duration { index: usize, duration_ms: u64 },
}

pub fn validate_questions(
    title: &str,
    questions: &[QuestionDefinition],
) -> Result<(), QuizValidationError> {
    let title_len = title.trim().chars().count();
    if title_len == 0 || title_len > MAX_TITLE_CHARS {
        return Err(QuizValidationError::Title);
    }
    if questions.is_empty() {
        return Err(QuizValidationError::NoQuestions);
    }
    for (index, question) in questions.iter().enumerate() {
        if question.prompt.trim().is_empty() {
            return Err(QuizValidationError::EmptyPrompt { index });
        }
        let count = question.options.len();
        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&count) {
            return Err(QuizValidationError::OptionCount { index, count });
        }
        if question.correct_index >= count {
            return Err(QuizValidationError::CorrectIndex {
                index,
                correct: question.correct_index,
            });
        }
        if !(MIN_DURATION_MS..=MAX_DURATION_MS).contains(&question.duration_ms) {
            return Err(QuizValidationError::Duration {
                index,
                duration_ms: question.duration_ms,
            });
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct QuizStore {
    pool: Pool<Sqlite>,
}

impl QuizStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every pooled connection to an in-memory url would see its own database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open quiz database '{database_url}'"))?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_quiz(&self, quiz: &NewQuiz) -> Result<QuizId> {
        validate_questions(&quiz.title, &quiz.questions)?;

        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query("INSERT INTO quizzes (title) VALUES (?) RETURNING id")
            .bind(quiz.title.trim())
            .fetch_one(&mut *tx)
            .await?;
        let quiz_id = QuizId(rec.get::<i64, _>(0));

        for (position, question) in quiz.questions.iter().enumerate() {
            let options_json = serde_json::to_string(&question.options)?;
            sqlx::query(
                "INSERT INTO questions (quiz_id, position, prompt, options_json, correct_index, duration_ms)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(quiz_id.0)
            .bind(position as i64)
            .bind(&question.prompt)
            .bind(options_json)
            .bind(question.correct_index as i64)
            .bind(question.duration_ms as i64)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to insert question {position}"))?;
        }
        tx.commit().await?;

        debug!(quiz_id = quiz_id.0, questions = quiz.questions.len(), "quiz stored");
        Ok(quiz_id)
    }

    pub async fn fetch_quiz(&self, quiz_id: QuizId) -> Result<Option<QuizDefinition>> {
        let Some(row) = sqlx::query("SELECT title FROM quizzes WHERE id = ?")
            .bind(quiz_id.0)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let title: String = row.get(0);

        let rows = sqlx::query(
            "SELECT prompt, options_json, correct_index, duration_ms
             FROM questions WHERE quiz_id = ? ORDER BY position ASC",
        )
        .bind(quiz_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            let options_json: String = row.get(1);
            let options: Vec<String> = serde_json::from_str(&options_json)
                .with_context(|| format!("corrupt options for quiz {}", quiz_id.0))?;
            questions.push(QuestionDefinition {
                prompt: row.get(0),
                options,
                correct_index: row.get::<i64, _>(2) as usize,
                duration_ms: row.get::<i64, _>(3) as u64,
            });
        }

        Ok(Some(QuizDefinition {
            quiz_id,
            title,
            questions,
        }))
    }

    pub async fn list_quizzes(&self) -> Result<Vec<QuizSummary>> {
        let rows = sqlx::query(
            "SELECT q.id, q.title, COUNT(qs.position)
             FROM quizzes q
             LEFT JOIN questions qs ON qs.quiz_id = q.id
             GROUP BY q.id, q.title
             ORDER BY q.id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| QuizSummary {
                quiz_id: QuizId(row.get::<i64, _>(0)),
                title: row.get(1),
                question_count: row.get::<i64, _>(2) as usize,
            })
            .collect())
    }

    pub async fn delete_quiz(&self, quiz_id: QuizId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM questions WHERE quiz_id = ?")
            .bind(quiz_id.0)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM quizzes WHERE id = ?")
            .bind(quiz_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
