use super::*;

fn question(prompt: &str, correct_index: usize) -> QuestionDefinition {
    QuestionDefinition {
        prompt: prompt.into(),
        options: vec!["red".into(), "green".into(), "blue".into()],
        correct_index,
        duration_ms: 10_000,
    }
}

fn sample_quiz() -> NewQuiz {
    NewQuiz {
        title: "Colours".into(),
        questions: vec![question("Sky?", 2), question("Grass?", 1)],
    }
}

#[tokio::test]
async fn stores_and_fetches_quiz_in_order() {
    let store = QuizStore::new("sqlite::memory:").await.expect("db");
    let quiz_id = store.create_quiz(&sample_quiz()).await.expect("quiz");

    let quiz = store
        .fetch_quiz(quiz_id)
        .await
        .expect("fetch")
        .expect("quiz exists");
    assert_eq!(quiz.title, "Colours");
    assert_eq!(quiz.questions.len(), 2);
    assert_eq!(quiz.questions[0].prompt, "Sky?");
    assert_eq!(quiz.questions[1].correct_index, 1);
    assert_eq!(quiz.questions[1].options.len(), 3);
}

#[tokio::test]
async fn unknown_quiz_is_none() {
    let store = QuizStore::new("sqlite::memory:").await.expect("db");
    let missing = store.fetch_quiz(QuizId(404)).await.expect("fetch");
    assert!(missing.is_none());
}

#[tokio::test]
async fn lists_quizzes_with_question_counts() {
    let store = QuizStore::new("sqlite::memory:").await.expect("db");
    store.create_quiz(&sample_quiz()).await.expect("first");
    let mut second = sample_quiz();
    second.title = "Short".into();
    second.questions.truncate(1);
    store.create_quiz(&second).await.expect("second");

    let summaries = store.list_quizzes().await.expect("list");
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].question_count, 2);
    assert_eq!(summaries[1].title, "Short");
    assert_eq!(summaries[1].question_count, 1);
}

#[tokio::test]
async fn rejects_invalid_quiz_before_writing() {
    let store = QuizStore::new("sqlite::memory:").await.expect("db");
    let mut quiz = sample_quiz();
    quiz.questions[1].correct_index = 7;

    let err = store.create_quiz(&quiz).await.expect_err("should fail");
    let validation = err
        .downcast_ref::<QuizValidationError>()
        .expect("validation error");
    assert_eq!(
        *validation,
        QuizValidationError::CorrectIndex {
            index: 1,
            correct: 7
        }
    );
    assert!(store.list_quizzes().await.expect("list").is_empty());
}

#[tokio::test]
async fn delete_removes_quiz_and_questions() {
    let store = QuizStore::new("sqlite::memory:").await.expect("db");
    let quiz_id = store.create_quiz(&sample_quiz()).await.expect("quiz");

    assert!(store.delete_quiz(quiz_id).await.expect("delete"));
    assert!(!store.delete_quiz(quiz_id).await.expect("second delete"));
    assert!(store.fetch_quiz(quiz_id).await.expect("fetch").is_none());
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let store = QuizStore::new("sqlite::memory:").await.expect("db");
    store.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let suffix = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = std::env::temp_dir().join(format!("quiz_store_test_{suffix}"));
    let db_path = temp_root.join("nested").join("quizzes.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let store = QuizStore::new(&database_url).await.expect("db");
    drop(store);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
    std::fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn validation_checks_option_bounds_and_duration() {
    let mut one_option = question("Lonely?", 0);
    one_option.options.truncate(1);
    assert_eq!(
        validate_questions("t", &[one_option]),
        Err(QuizValidationError::OptionCount { index: 0, count: 1 })
    );

    let mut fast = question("Fast?", 0);
    fast.duration_ms = 10;
    assert_eq!(
        validate_questions("t", &[fast]),
        Err(QuizValidationError::Duration {
            index: 0,
            duration_ms: 10
        })
    );

    assert_eq!(
        validate_questions("  ", &[question("ok", 0)]),
        Err(QuizValidationError::Title)
    );
    assert_eq!(validate_questions("t", &[]), Err(QuizValidationError::NoQuestions));
}
