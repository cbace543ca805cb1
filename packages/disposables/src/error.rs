use thiserror::Error;

/// Boxed error type carried by [`Error::Teardown`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur when disposing of resources.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The object has already entered its terminal disposed state.
    ///
    /// This is only returned by the opt-in `ensure_not_disposed()` assertions. Adding to or
    /// disposing a disposed object never fails with this error.
    #[error("the object has already been disposed")]
    AlreadyDisposed,

    /// The teardown logic of a resource failed.
    #[error("resource teardown failed: {0}")]
    Teardown(#[source] BoxError),
}

impl Error {
    /// Wraps an arbitrary teardown failure.
    ///
    /// # Example
    ///
    /// ```rust
    /// use disposables::Error;
    ///
    /// let error = Error::teardown("socket was already closed");
    /// assert!(matches!(error, Error::Teardown(_)));
    /// ```
    #[must_use]
    pub fn teardown(source: impl Into<BoxError>) -> Self {
        Self::Teardown(source.into())
    }
}

/// A specialized `Result` type for disposal operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
