use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Reference table '{table}' is unusable: {message}")]
    ReferenceDataError { table: String, message: String },

    #[error("Input dataset has no column '{column}'")]
    MissingColumnError { column: String },

    #[error("{oracle} oracle temporarily unavailable: {message}")]
    OracleTransient { oracle: String, message: String },

    #[error("{oracle} oracle returned an unusable response: {message}")]
    OracleResponse { oracle: String, message: String },

    #[error("Run interrupted before {stage}")]
    Interrupted { stage: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    ReferenceData,
    Input,
    Network,
    Storage,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::ConfigError { .. }
            | EtlError::ConfigValidationError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::PatternError(_) => ErrorCategory::Configuration,
            EtlError::ReferenceDataError { .. } => ErrorCategory::ReferenceData,
            EtlError::MissingColumnError { .. } | EtlError::CsvError(_) => ErrorCategory::Input,
            EtlError::ApiError(_)
            | EtlError::OracleTransient { .. }
            | EtlError::OracleResponse { .. } => ErrorCategory::Network,
            EtlError::IoError(_) | EtlError::ZipError(_) => ErrorCategory::Storage,
            EtlError::SerializationError(_)
            | EtlError::Interrupted { .. }
            | EtlError::ProcessingError { .. } => ErrorCategory::Processing,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::Interrupted { .. } => ErrorSeverity::Low,
            EtlError::ApiError(_)
            | EtlError::OracleTransient { .. }
            | EtlError::OracleResponse { .. } => ErrorSeverity::Medium,
            EtlError::IoError(_) | EtlError::ZipError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// 是否值得重試 (網路逾時、連線失敗、429 與 5xx)
    pub fn is_transient(&self) -> bool {
        match self {
            EtlError::OracleTransient { .. } => true,
            EtlError::ApiError(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    return true;
                }
                e.status()
                    .map(|s| s.as_u16() == 429 || s.is_server_error())
                    .unwrap_or(false)
            }
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the command line flags or the TOML file against the documented options"
            }
            ErrorCategory::ReferenceData => {
                "Make sure the Census county, place-by-county and ZCTA tables are the pipe-delimited 2020 files"
            }
            ErrorCategory::Input => {
                "Check the input delimiter and that the city/state/zip column names match the dataset header"
            }
            ErrorCategory::Network => {
                "The oracle endpoint may be rate limiting; rerun later, cached responses will not be requested again"
            }
            ErrorCategory::Storage => "Check that the output directory exists and is writable",
            ErrorCategory::Processing => "Rerun with --verbose and inspect the log",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::MissingColumnError { column } => {
                format!("The input file does not contain the column '{}'", column)
            }
            EtlError::ReferenceDataError { table, .. } => {
                format!("Reference table '{}' could not be used", table)
            }
            EtlError::Interrupted { .. } => {
                "The run was interrupted; everything cached so far is kept".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
