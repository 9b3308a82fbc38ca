pub mod ai;
pub mod app;
pub mod db;
pub mod debounce;
pub mod errors;
pub mod models;
pub mod telemetry;
pub mod ui_state;

pub use crate::ai::{ChatTurn, CompletionClient, CompletionFuture, OpenAiClient, OpenAiConfig};
pub use crate::app::AppCore;
pub use crate::db::Database;
pub use crate::debounce::BodySaveDebouncer;
pub use crate::errors::{AppError, AppResult};
