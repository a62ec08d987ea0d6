/// All errors a remote collaborator can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The service processed the request and reported failure. The message
    /// is meant for the user.
    #[error("{message}")]
    Failed { message: String },

    /// No record with the given id.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A uniqueness check found an existing record.
    #[error("{field} '{value}' already exists")]
    AlreadyExists { field: &'static str, value: String },

    /// The request did not reach the service or its reply was unreadable.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ServiceError {
    pub fn failed(message: impl Into<String>) -> Self {
        ServiceError::Failed {
            message: message.into(),
        }
    }
}
