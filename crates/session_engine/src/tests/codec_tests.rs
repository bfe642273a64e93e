use super::*;
use serde_json::json;
use shared::{
    domain::{PlayerId, QuizId, SessionCode},
    error::{ApiError, ErrorCode},
};

const MAX: usize = 4096;

#[test]
fn decodes_join_session() {
    let raw = json!({
        "type": "join_session",
        "payload": { "session_id": "482913", "player_name": "Ada" }
    })
    .to_string();

    let command = decode(&raw, MAX).expect("decode");
    assert_eq!(
        command,
        ClientCommand::JoinSession {
            session_id: SessionCode::new("482913"),
            player_name: "Ada".into(),
        }
    );
}

#[test]
fn decodes_unit_commands_without_payload() {
    let command = decode(r#"{"type":"start_quiz"}"#, MAX).expect("decode");
    assert_eq!(command, ClientCommand::StartQuiz);

    let command = decode(r#"{"type":"leave_session"}"#, MAX).expect("decode");
    assert_eq!(command, ClientCommand::LeaveSession);
}

#[test]
fn decodes_create_and_submit() {
    let command = decode(r#"{"type":"create_session","payload":{"quiz_id":7}}"#, MAX)
        .expect("decode");
    assert_eq!(command, ClientCommand::CreateSession { quiz_id: QuizId(7) });

    let command = decode(r#"{"type":"submit_answer","payload":{"option_index":2}}"#, MAX)
        .expect("decode");
    assert_eq!(command, ClientCommand::SubmitAnswer { option_index: 2 });
}

#[test]
fn rejects_empty_and_oversized_frames() {
    assert_eq!(decode("", MAX), Err(DecodeError::Empty));
    assert_eq!(decode("   \n", MAX), Err(DecodeError::Empty));

    let raw = format!(r#"{{"type":"join_session","payload":{{"session_id":"1","player_name":"{}"}}}}"#, "x".repeat(64));
    assert!(matches!(
        decode(&raw, 32),
        Err(DecodeError::TooLarge { max: 32, .. })
    ));
}

#[test]
fn classifies_bad_frames() {
    assert!(matches!(decode("{not json", MAX), Err(DecodeError::Malformed(_))));
    assert_eq!(
        decode(r#"{"payload":{}}"#, MAX),
        Err(DecodeError::MissingType)
    );
    assert_eq!(decode(r#"{"type":5}"#, MAX), Err(DecodeError::MissingType));
    assert_eq!(
        decode(r#"{"type":"kick_player","payload":{}}"#, MAX),
        Err(DecodeError::UnknownType("kick_player".into()))
    );
    assert!(matches!(
        decode(r#"{"type":"submit_answer","payload":{"option_index":"two"}}"#, MAX),
        Err(DecodeError::InvalidPayload { kind, .. }) if kind == "submit_answer"
    ));
}

#[test]
fn binary_frames_must_be_utf8() {
    let command = decode_bytes(br#"{"type":"start_quiz"}"#, MAX).expect("decode");
    assert_eq!(command, ClientCommand::StartQuiz);
    assert!(matches!(
        decode_bytes(&[0xff, 0xfe, 0x00], MAX),
        Err(DecodeError::Malformed(_))
    ));
}

#[test]
fn decode_error_maps_to_decode_error_code() {
    let err: SessionError = DecodeError::MissingType.into();
    assert_eq!(err.code(), ErrorCode::DecodeError);
}

#[test]
fn encodes_events_with_type_and_payload() {
    let frame = encode(&ServerEvent::PlayerJoined {
        player_id: PlayerId(1),
        name: "Ada".into(),
    })
    .expect("encode");
    let value: Value = serde_json::from_str(&frame).expect("json");
    assert_eq!(value["type"], "player_joined");
    assert_eq!(value["payload"]["player_id"], 1);
    assert_eq!(value["payload"]["name"], "Ada");

    let frame = encode(&ServerEvent::Error(ApiError::new(
        ErrorCode::SessionNotFound,
        "session 1 not found",
    )))
    .expect("encode");
    let value: Value = serde_json::from_str(&frame).expect("json");
    assert_eq!(value["type"], "error");
    assert_eq!(value["payload"]["code"], "session_not_found");
}

#[test]
fn round_started_never_carries_the_correct_index() {
    let frame = encode(&ServerEvent::RoundStarted {
        round_index: 0,
        question_count: 2,
        question: "2 + 2?".into(),
        options: vec!["3".into(), "4".into()],
        duration_ms: 10_000,
        remaining_ms: 10_000,
    })
    .expect("encode");
    assert!(!frame.contains("correct"));
}
