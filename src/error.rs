/// Problems that abort a translation run. Everything recoverable is a
/// [`Diagnostic`](crate::translate::error::Diagnostic) on the session instead.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    /// The operator table is inconsistent. Raised while building the grammar,
    /// before any source is read.
    #[error("grammar conflict: {0}")]
    Grammar(String),

    #[error("line {line}: {message}")]
    MalformedPackage { message: String, line: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid options: {0}")]
    Options(String),
}

impl From<serde_json::Error> for TranslateError {
    fn from(e: serde_json::Error) -> Self {
        TranslateError::Options(e.to_string())
    }
}
