//! CLI error types with exit code handling

use chartwatch_core::CoreError;
use chartwatch_kube::KubeError;
use chartwatch_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Configuration could not be loaded
    #[error("Configuration error: {message}")]
    #[diagnostic(code(chartwatch::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Invalid command-line input
    #[error("Invalid input: {message}")]
    #[diagnostic(code(chartwatch::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Kubernetes API failure
    #[error("Kubernetes error: {message}")]
    #[diagnostic(code(chartwatch::cli::kube))]
    Kube { message: String },

    /// Object or cache entry does not exist
    #[error("{message}")]
    #[diagnostic(code(chartwatch::cli::not_found))]
    NotFound {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Stored data could not be decoded
    #[error("{message}")]
    #[diagnostic(code(chartwatch::cli::data))]
    Data { message: String },

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(chartwatch::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Input { .. } => exit_codes::USAGE_ERROR,
            CliError::Kube { .. } => exit_codes::KUBE_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Data { .. } => exit_codes::DATA_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn not_found_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidKey { input } => CliError::input_with_help(
                format!("'{input}' is not a namespace/name reference"),
                "use the form <namespace>/<name>",
            ),
            other => CliError::Config {
                message: other.to_string(),
                help: Some("check the file passed with --config".to_string()),
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        if err.is_not_found() {
            return CliError::NotFound {
                message: err.to_string(),
                help: None,
            };
        }
        match err {
            KubeError::Api(_) => CliError::Kube {
                message: err.to_string(),
            },
            KubeError::CorruptStorageRecord { .. } | KubeError::ManifestParse { .. } => {
                CliError::Data {
                    message: err.to_string(),
                }
            }
            other => CliError::Other {
                message: other.to_string(),
            },
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        if err.is_cache_miss() {
            return CliError::not_found_with_help(
                err.to_string(),
                "run `chartwatch profiles --refresh` or start `chartwatch watch` with a sqlite cache",
            );
        }
        CliError::Other {
            message: err.to_string(),
        }
    }
}

impl From<kube::Error> for CliError {
    fn from(err: kube::Error) -> Self {
        KubeError::from(err).into()
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Other {
            message: err.to_string(),
        }
    }
}

impl From<miette::Report> for CliError {
    fn from(err: miette::Report) -> Self {
        CliError::Other {
            message: format!("{:?}", err),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
