use thiserror::Error;

/// Fatal schema problems detected while normalizing the raw rows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A required column is absent from the header row (after trimming)
    #[error("column '{0}' not found; check the header row of the worksheet")]
    MissingColumn(String),
}

/// Per-cell parse failure.
///
/// These are always recovered where they occur: a bad date drops the row,
/// a bad number becomes zero. They are never shown on the page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellParseError {
    #[error("'{0}' is not a day/month/year date")]
    Date(String),

    #[error("'{0}' is not a number")]
    Number(String),
}

/// Access gate failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("incorrect password")]
    WrongPassword,

    #[error("session missing or expired")]
    NotAuthenticated,

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Everything that can stop a dashboard render.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// The spreadsheet could not be reached, authenticated against, or found
    #[error("connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("chart rendering failed: {0}")]
    Chart(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DashboardError {
    /// Whether the error should send the user back to the login form
    /// rather than to the error page.
    pub fn is_auth(&self) -> bool {
        matches!(self, DashboardError::Auth(_))
    }
}

pub type Result<T, E = DashboardError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_converts_into_dashboard_error() {
        let err: DashboardError = SchemaError::MissingColumn("DATE".to_string()).into();
        assert!(matches!(err, DashboardError::Schema(_)));
        assert!(err.to_string().contains("DATE"));
        assert!(!err.is_auth());
    }

    #[test]
    fn auth_errors_are_flagged() {
        let err: DashboardError = AuthError::WrongPassword.into();
        assert!(err.is_auth());
    }
}
