/*
[INPUT]:  Raw operation failures (anyhow::Error), optional caller mapping function
[OUTPUT]: Failures translated into the holder's declared error type, or nothing
[POS]:    Error mapping layer - used by holder completions and collaborators
[UPDATE]: When the mapping precedence rules change
*/

use std::fmt;
use std::sync::Arc;

/// Caller supplied translation from a raw failure to the declared error type.
///
/// Returning `None` means the failure is not representable and is dropped.
pub struct ErrorMapper<E> {
    map: Arc<dyn Fn(&anyhow::Error) -> Option<E> + Send + Sync>,
}

impl<E> ErrorMapper<E> {
    pub fn new<F>(map: F) -> Self
    where
        F: Fn(&anyhow::Error) -> Option<E> + Send + Sync + 'static,
    {
        Self { map: Arc::new(map) }
    }

    pub fn apply(&self, failure: &anyhow::Error) -> Option<E> {
        (self.map)(failure)
    }
}

impl<E> Clone for ErrorMapper<E> {
    fn clone(&self) -> Self {
        Self {
            map: Arc::clone(&self.map),
        }
    }
}

impl<E> fmt::Debug for ErrorMapper<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorMapper").finish_non_exhaustive()
    }
}

/// Translate a raw failure.
///
/// A configured mapper always wins, including when it returns `None`. Without
/// one, the failure is kept only if it already is an `E`.
pub fn map_failure<E>(mapper: Option<&ErrorMapper<E>>, failure: anyhow::Error) -> Option<E>
where
    E: fmt::Display + fmt::Debug + Send + Sync + 'static,
{
    match mapper {
        Some(mapper) => mapper.apply(&failure),
        None => failure.downcast::<E>().ok(),
    }
}
