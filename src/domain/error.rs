//! Domain error types.

/// Top-level error type for stockpick.
#[derive(Debug, thiserror::Error)]
pub enum StockpickError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("watchlist error: {reason}")]
    Watchlist { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("rule {rule_id} failed: {reason}")]
    RuleFailed { rule_id: String, reason: String },

    #[error("unknown rule: {0}")]
    UnknownRule(String),

    #[error("unknown screener preset: {0}")]
    UnknownPreset(String),

    #[error("no data for {code}")]
    NoData { code: String },

    #[error("insufficient data for {code}: have {bars} bars, need {minimum}")]
    InsufficientData {
        code: String,
        bars: usize,
        minimum: usize,
    },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("llm request failed: {reason}")]
    Llm { reason: String },

    #[error("task {task_id}: {reason}")]
    Task { task_id: String, reason: String },

    #[error("scheduler error: {reason}")]
    Scheduler { reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&StockpickError> for std::process::ExitCode {
    fn from(err: &StockpickError) -> Self {
        let code: u8 = match err {
            StockpickError::Io(_) | StockpickError::Json(_) => 1,
            StockpickError::ConfigParse { .. }
            | StockpickError::ConfigMissing { .. }
            | StockpickError::ConfigInvalid { .. } => 2,
            StockpickError::Database { .. }
            | StockpickError::DatabaseQuery { .. }
            | StockpickError::Watchlist { .. } => 3,
            StockpickError::RuleFailed { .. }
            | StockpickError::UnknownRule(_)
            | StockpickError::UnknownPreset(_) => 4,
            StockpickError::NoData { .. } | StockpickError::InsufficientData { .. } => 5,
            StockpickError::UnknownProvider(_) | StockpickError::Llm { .. } => 6,
            StockpickError::Task { .. } | StockpickError::Scheduler { .. } => 7,
        };
        std::process::ExitCode::from(code)
    }
}
