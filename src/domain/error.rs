//! Domain error types.

/// Top-level error type for rotrader.
#[derive(Debug, thiserror::Error)]
pub enum RotraderError {
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

    #[error("price store error: {reason}")]
    Store { reason: String },

    #[error("insufficient data: {reason}")]
    InsufficientData { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&RotraderError> for std::process::ExitCode {
    fn from(err: &RotraderError) -> Self {
        let code: u8 = match err {
            RotraderError::Io(_) => 1,
            RotraderError::ConfigParse { .. }
            | RotraderError::ConfigMissing { .. }
            | RotraderError::ConfigInvalid { .. } => 2,
            RotraderError::Store { .. } => 3,
            RotraderError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
