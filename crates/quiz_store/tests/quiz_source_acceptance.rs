use quiz_store::{MemoryQuizSource, NewQuiz, QuizFetchError, QuizSource, QuizStore};
use shared::domain::{QuestionDefinition, QuizDefinition, QuizId};

fn question(prompt: &str) -> QuestionDefinition {
    QuestionDefinition {
        prompt: prompt.into(),
        options: vec!["yes".into(), "no".into()],
        correct_index: 0,
        duration_ms: 5_000,
    }
}

#[tokio::test]
async fn sqlite_store_serves_quizzes_through_source_trait() {
    let store = QuizStore::new("sqlite::memory:").await.expect("db");
    let quiz_id = store
        .create_quiz(&NewQuiz {
            title: "Trivia".into(),
            questions: vec![question("One?"), question("Two?")],
        })
        .await
        .expect("quiz");

    let source: &dyn QuizSource = &store;
    let quiz = source.fetch_quiz_by_id(quiz_id).await.expect("fetch");
    assert_eq!(quiz.quiz_id, quiz_id);
    assert_eq!(quiz.questions.len(), 2);

    let err = source
        .fetch_quiz_by_id(QuizId(quiz_id.0 + 100))
        .await
        .expect_err("unknown id");
    assert!(matches!(err, QuizFetchError::NotFound(_)));
}

#[tokio::test]
async fn memory_source_rejects_unplayable_quiz() {
    let source = MemoryQuizSource::new([QuizDefinition {
        quiz_id: QuizId(1),
        title: "Empty".into(),
        questions: vec![],
    }]);

    let err = source
        .fetch_quiz_by_id(QuizId(1))
        .await
        .expect_err("no questions");
    assert!(matches!(err, QuizFetchError::Invalid { .. }));
}

#[tokio::test]
async fn memory_source_returns_latest_insert() {
    let source = MemoryQuizSource::default();
    source
        .insert(QuizDefinition {
            quiz_id: QuizId(3),
            title: "First".into(),
            questions: vec![question("A?")],
        })
        .await;
    source
        .insert(QuizDefinition {
            quiz_id: QuizId(3),
            title: "Second".into(),
            questions: vec![question("B?")],
        })
        .await;

    let quiz = source.fetch_quiz_by_id(QuizId(3)).await.expect("fetch");
    assert_eq!(quiz.title, "Second");
}
