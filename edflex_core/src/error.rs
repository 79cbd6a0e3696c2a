use std::error::Error as StdError;

/// Common error type for `edflex_core`.
///
/// Storage and transport implementations should preserve the underlying error
/// chain where possible via `Error::backend`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// An upstream record references a local row that does not exist.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("connectivity: {0}")]
    Connectivity(String),

    #[error("backend error: {context}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    #[error("backend error: {0}")]
    BackendMessage(String),
}

impl Error {
    pub fn backend(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn backend_reqwest(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::backend("reqwest", source)
    }

    /// Convenience: wrap an sqlx error with the given storage context.
    pub fn sqlx(context: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |e| Self::backend(context, e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_keeps_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = Error::backend("sqlite_category_store", io);
        assert_eq!(err.to_string(), "backend error: sqlite_category_store");
        let source = StdError::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("disk gone"));
    }
}
