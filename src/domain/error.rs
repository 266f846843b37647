//! Domain error types.

/// Top-level error type for portcon.
#[derive(Debug, thiserror::Error)]
pub enum PortconError {
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

    /// Caller bug detected at construction or call time (mismatched asset
    /// sets, conflicting exposure targets, unknown weekday, ...).
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("insufficient data for {context}: have {observations} observations, need {minimum}")]
    InsufficientData {
        context: String,
        observations: usize,
        minimum: usize,
    },

    #[error(
        "optimization failed ({objective} objective, constraints [{}]) after {iterations} iterations: {reason}; max violation {violation:.3e}, last iterate {last_iterate:?}",
        .constraints.join(", ")
    )]
    Optimization {
        objective: String,
        constraints: Vec<String>,
        iterations: usize,
        violation: f64,
        last_iterate: Vec<f64>,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PortconError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        PortconError::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether the error must abort the whole session rather than only the
    /// current rebalance tick.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(
            self,
            PortconError::InsufficientData { .. } | PortconError::Optimization { .. }
        )
    }
}

impl From<&PortconError> for std::process::ExitCode {
    fn from(err: &PortconError) -> Self {
        let code: u8 = match err {
            PortconError::Io(_) => 1,
            PortconError::ConfigParse { .. }
            | PortconError::ConfigMissing { .. }
            | PortconError::ConfigInvalid { .. }
            | PortconError::Configuration { .. } => 2,
            PortconError::Data { .. } => 3,
            PortconError::InsufficientData { .. } => 5,
            PortconError::Optimization { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_level_errors_are_not_fatal() {
        let err = PortconError::InsufficientData {
            context: "risk model".into(),
            observations: 0,
            minimum: 2,
        };
        assert!(!err.is_session_fatal());

        let err = PortconError::Optimization {
            objective: "sharpe".into(),
            constraints: vec!["gross_exposure".into()],
            iterations: 10,
            violation: 0.5,
            last_iterate: vec![0.5, 0.5],
            reason: "constraint tolerance not reached".into(),
        };
        assert!(!err.is_session_fatal());
    }

    #[test]
    fn configuration_errors_are_fatal() {
        assert!(PortconError::configuration("bad weekday").is_session_fatal());
        assert!(
            PortconError::Data {
                reason: "unreadable".into()
            }
            .is_session_fatal()
        );
    }

    #[test]
    fn optimization_message_lists_context() {
        let err = PortconError::Optimization {
            objective: "mean_variance".into(),
            constraints: vec!["gross_exposure".into(), "net_exposure".into()],
            iterations: 3,
            violation: 1e-2,
            last_iterate: vec![1.0],
            reason: "constraint tolerance not reached".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("mean_variance"));
        assert!(msg.contains("gross_exposure, net_exposure"));
        assert!(msg.contains("[1.0]"));
    }
}
