use std::sync::Arc;

use quiz_store::QuizStore;
use session_engine::Dispatcher;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: QuizStore,
    pub(crate) dispatcher: Arc<Dispatcher>,
}
