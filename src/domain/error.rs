//! Domain error types.

/// Top-level error type for picklab.
#[derive(Debug, thiserror::Error)]
pub enum PicklabError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

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

    #[error("no data: {what}")]
    NoData { what: String },

    #[error("insufficient data: have {available_days} days of picks, need {required_days}")]
    InsufficientData {
        available_days: i64,
        required_days: i64,
    },

    #[error("unauthorized: {action} requires a valid admin credential")]
    Unauthorized { action: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for PicklabError {
    fn from(err: serde_json::Error) -> Self {
        PicklabError::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<&PicklabError> for std::process::ExitCode {
    fn from(err: &PicklabError) -> Self {
        let code: u8 = match err {
            PicklabError::Io(_) | PicklabError::Serialization { .. } => 1,
            PicklabError::ConfigParse { .. }
            | PicklabError::ConfigMissing { .. }
            | PicklabError::ConfigInvalid { .. } => 2,
            PicklabError::Database { .. } | PicklabError::DatabaseQuery { .. } => 3,
            PicklabError::NoData { .. } | PicklabError::InsufficientData { .. } => 5,
            PicklabError::Unauthorized { .. } | PicklabError::InvalidRequest { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_message() {
        let err = PicklabError::InsufficientData {
            available_days: 45,
            required_days: 80,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data: have 45 days of picks, need 80"
        );
    }

    #[test]
    fn unauthorized_message_names_action() {
        let err = PicklabError::Unauthorized {
            action: "validate_all".into(),
        };
        assert!(err.to_string().contains("validate_all"));
    }

    #[test]
    fn serde_json_error_converts() {
        let parse = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: PicklabError = parse.into();
        assert!(matches!(err, PicklabError::Serialization { .. }));
    }
}
