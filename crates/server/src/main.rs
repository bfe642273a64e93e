use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use quiz_store::QuizStore;
use session_engine::Dispatcher;
use shared::{
    domain::{QuizId, QuizSummary},
    error::{ApiError, ErrorCode},
    protocol::{EndReason, QuizOutline},
};
use tokio::sync::mpsc;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use crate::app_state::AppState;
use crate::config::{load_settings, normalize_database_url};

const MAX_REQUEST_BYTES: usize = 64 * 1024;

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings()?;
    let database_url = normalize_database_url(&settings.database_url);
    let store = QuizStore::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let dispatcher = Arc::new(Dispatcher::new(settings.engine, Arc::new(store.clone())));
    let app = build_router(Arc::new(AppState {
        store,
        dispatcher: Arc::clone(&dispatcher),
    }));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            dispatcher.shutdown(EndReason::Shutdown).await;
        })
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/quizzes", get(http_list_quizzes))
        .route("/quizzes/:quiz_id", get(http_get_quiz))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .with_state(state)
}

fn internal(error: anyhow::Error) -> HttpError {
    error!(%error, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::new(ErrorCode::Internal, error.to_string())),
    )
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            error!(%error, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

async fn http_list_quizzes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<QuizSummary>>, HttpError> {
    let quizzes = state.store.list_quizzes().await.map_err(internal)?;
    Ok(Json(quizzes))
}

async fn http_get_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<i64>,
) -> Result<Json<QuizOutline>, HttpError> {
    let quiz = state
        .store
        .fetch_quiz(QuizId(quiz_id))
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiError::new(
                    ErrorCode::QuizLoadFailure,
                    format!("quiz {quiz_id} does not exist"),
                )),
            )
        })?;
    Ok(Json(QuizOutline::from(quiz)))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let max_frame_bytes = state.dispatcher.config().max_frame_bytes;
    ws.max_message_size(max_frame_bytes)
        .max_frame_size(max_frame_bytes)
        .on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let dispatcher = Arc::clone(&state.dispatcher);
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(dispatcher.config().outbound_buffer);
    let connection = dispatcher.connect(tx).await;
    info!(%connection, "websocket connected");

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => dispatcher.handle_frame(connection, &text).await,
            Ok(Message::Binary(bytes)) => dispatcher.handle_binary(connection, &bytes).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                debug!(%connection, %error, "websocket read failed");
                break;
            }
        }
    }

    dispatcher.disconnect(connection).await;
    send_task.abort();
    info!(%connection, "websocket closed");
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
