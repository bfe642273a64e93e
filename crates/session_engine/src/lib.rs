//! Real-time orchestration of hosted quiz sessions: connection bookkeeping,
//! per-session serialized workers, round timers, scoring and fan-out.

pub mod broadcaster;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod manager;
pub mod registry;
pub mod rejoin;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod worker;

pub use config::{ConfigError, EngineConfig};
pub use dispatcher::Dispatcher;
pub use manager::{SessionDirectory, SessionManager};
pub use registry::{ConnectionRegistry, FrameSink, SendError};
pub use scoring::ScoringRules;
pub use session::{Phase, Session};
pub use worker::{SessionCommand, SessionHandle, SessionInput};
