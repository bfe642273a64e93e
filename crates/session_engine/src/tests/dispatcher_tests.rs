use super::*;
use quiz_store::MemoryQuizSource;
use serde_json::{json, Value};
use shared::domain::{QuestionDefinition, QuizDefinition, QuizId};
use tokio::sync::mpsc;

fn dispatcher() -> Dispatcher {
    let quiz = QuizDefinition {
        quiz_id: QuizId(1),
        title: "Planets".into(),
        questions: vec![QuestionDefinition {
            prompt: "Largest planet?".into(),
            options: vec!["Mars".into(), "Jupiter".into()],
            correct_index: 1,
            duration_ms: 10_000,
        }],
    };
    Dispatcher::new(
        EngineConfig {
            token_secret: Some("dispatcher-secret".into()),
            ..EngineConfig::default()
        },
        Arc::new(MemoryQuizSource::new([quiz])),
    )
}

async fn next(rx: &mut mpsc::Receiver<String>) -> Value {
    let frame = rx.recv().await.expect("frame");
    serde_json::from_str(&frame).expect("json")
}

async fn next_error_code(rx: &mut mpsc::Receiver<String>) -> String {
    loop {
        let value = next(rx).await;
        if value["type"] == "error" {
            return value["payload"]["code"]
                .as_str()
                .expect("code")
                .to_string();
        }
    }
}

async fn create(dispatcher: &Dispatcher) -> (ConnectionId, mpsc::Receiver<String>, String) {
    let (tx, mut rx) = mpsc::channel(32);
    let host = dispatcher.connect(tx).await;
    dispatcher
        .handle_frame(host, &json!({"type": "create_session", "payload": {"quiz_id": 1}}).to_string())
        .await;
    let created = next(&mut rx).await;
    assert_eq!(created["type"], "session_created");
    let code = created["payload"]["session_id"]
        .as_str()
        .expect("code")
        .to_string();
    (host, rx, code)
}

#[tokio::test]
async fn malformed_frame_gets_decode_error_and_connection_survives() {
    let dispatcher = dispatcher();
    let (tx, mut rx) = mpsc::channel(8);
    let connection = dispatcher.connect(tx).await;

    dispatcher.handle_frame(connection, "{oops").await;
    assert_eq!(next_error_code(&mut rx).await, "decode_error");
    dispatcher.handle_binary(connection, &[0xc3, 0x28]).await;
    assert_eq!(next_error_code(&mut rx).await, "decode_error");

    dispatcher
        .handle_frame(connection, r#"{"type":"start_quiz"}"#)
        .await;
    assert_eq!(next_error_code(&mut rx).await, "unauthorized_role");
}

#[tokio::test]
async fn joining_unknown_session_is_reported() {
    let dispatcher = dispatcher();
    let (tx, mut rx) = mpsc::channel(8);
    let connection = dispatcher.connect(tx).await;

    dispatcher
        .handle_command(
            connection,
            ClientCommand::JoinSession {
                session_id: SessionCode::new("000000"),
                player_name: "Ada".into(),
            },
        )
        .await;
    assert_eq!(next_error_code(&mut rx).await, "session_not_found");
}

#[tokio::test]
async fn host_cannot_create_twice_or_join_elsewhere() {
    let dispatcher = dispatcher();
    let (host, mut rx, _code) = create(&dispatcher).await;

    dispatcher
        .handle_command(host, ClientCommand::CreateSession { quiz_id: QuizId(1) })
        .await;
    assert_eq!(next_error_code(&mut rx).await, "already_in_session");

    dispatcher
        .handle_command(
            host,
            ClientCommand::JoinSession {
                session_id: SessionCode::new("999999x"),
                player_name: "Sneaky".into(),
            },
        )
        .await;
    assert_eq!(next_error_code(&mut rx).await, "already_in_session");
}

#[tokio::test]
async fn host_cannot_join_own_session_as_player() {
    let dispatcher = dispatcher();
    let (host, mut rx, code) = create(&dispatcher).await;

    dispatcher
        .handle_command(
            host,
            ClientCommand::JoinSession {
                session_id: SessionCode::new(code),
                player_name: "Host".into(),
            },
        )
        .await;
    assert_eq!(next_error_code(&mut rx).await, "already_in_session");
}

#[tokio::test]
async fn unknown_quiz_yields_quiz_load_failure() {
    let dispatcher = dispatcher();
    let (tx, mut rx) = mpsc::channel(8);
    let connection = dispatcher.connect(tx).await;

    dispatcher
        .handle_command(connection, ClientCommand::CreateSession { quiz_id: QuizId(9) })
        .await;
    assert_eq!(next_error_code(&mut rx).await, "quiz_load_failure");
    assert!(dispatcher.registry().membership(connection).await.is_none());
}

#[tokio::test]
async fn shutdown_ends_every_session() {
    let dispatcher = dispatcher();
    let (_host, mut rx, code) = create(&dispatcher).await;

    dispatcher.shutdown(EndReason::Shutdown).await;
    let ended = next(&mut rx).await;
    assert_eq!(ended["type"], "session_ended");
    assert_eq!(ended["payload"]["reason"], "shutdown");
    assert!(dispatcher
        .manager()
        .lookup(&SessionCode::new(code))
        .await
        .is_err());
}
