use std::collections::HashMap;

use async_trait::async_trait;
use shared::domain::{QuizDefinition, QuizId};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::{validate_questions, QuizStore, QuizValidationError};

#[derive(Debug, Error)]
pub enum QuizFetchError {
    #[error("quiz {0} does not exist")]
    NotFound(QuizId),
    #[error("quiz {quiz_id} is not playable: {source}")]
    Invalid {
        quiz_id: QuizId,
        source: QuizValidationError,
    },
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Read-only view of quiz definitions used when a session is created.
#[async_trait]
pub trait QuizSource: Send + Sync {
    async fn fetch_quiz_by_id(&self, quiz_id: QuizId) -> Result<QuizDefinition, QuizFetchError>;
}

fn ensure_playable(quiz: QuizDefinition) -> Result<QuizDefinition, QuizFetchError> {
    validate_questions(&quiz.title, &quiz.questions).map_err(|source| {
        QuizFetchError::Invalid {
            quiz_id: quiz.quiz_id,
            source,
        }
    })?;
    Ok(quiz)
}

#[async_trait]
impl QuizSource for QuizStore {
    async fn fetch_quiz_by_id(&self, quiz_id: QuizId) -> Result<QuizDefinition, QuizFetchError> {
        let quiz = self
            .fetch_quiz(quiz_id)
            .await?
            .ok_or(QuizFetchError::NotFound(quiz_id))?;
        ensure_playable(quiz)
    }
}

/// Quiz source held entirely in memory.
#[derive(Default)]
pub struct MemoryQuizSource {
    quizzes: RwLock<HashMap<QuizId, QuizDefinition>>,
}

impl MemoryQuizSource {
    pub fn new(quizzes: impl IntoIterator<Item = QuizDefinition>) -> Self {
        Self {
            quizzes: RwLock::new(
                quizzes
                    .into_iter()
                    .map(|quiz| (quiz.quiz_id, quiz))
                    .collect(),
            ),
        }
    }

    /// Inserts or replaces a quiz.
    pub async fn insert(&self, quiz: QuizDefinition) {
        self.quizzes.write().await.insert(quiz.quiz_id, quiz);
    }
}

#[async_trait]
impl QuizSource for MemoryQuizSource {
    async fn fetch_quiz_by_id(&self, quiz_id: QuizId) -> Result<QuizDefinition, QuizFetchError> {
        let quiz = self
            .quizzes
            .read()
            .await
            .get(&quiz_id)
            .cloned()
            .ok_or(QuizFetchError::NotFound(quiz_id))?;
        ensure_playable(quiz)
    }
}
