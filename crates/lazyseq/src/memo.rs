//! Write-once cache cell for materializing operators.
//!
//! [`MemoCell`] stores the result of a fallible computation the first time it
//! succeeds. A failed computation leaves the cell empty so a later traversal
//! tries again; a successful one is never recomputed.

use std::sync::OnceLock;

use crate::error::Result;

pub(crate) struct MemoCell<T>(OnceLock<T>);

impl<T> MemoCell<T> {
    pub(crate) fn new() -> Self {
        Self(OnceLock::new())
    }

    #[cfg(test)]
    fn is_set(&self) -> bool {
        self.0.get().is_some()
    }
}

impl<T: Clone> MemoCell<T> {
    #[cfg(test)]
    fn get(&self) -> Option<T> {
        self.0.get().cloned()
    }

    /// Returns the stored value, computing it with `f` first if the cell is
    /// empty. The computation runs without holding any lock, so it may itself
    /// traverse other cached sequences. If two computations race, the first
    /// stored value wins and both callers observe it.
    pub(crate) fn get_or_try_init(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Some(value) = self.0.get() {
            return Ok(value.clone());
        }
        let value = f()?;
        Ok(self.0.get_or_init(|| value).clone())
    }
}

impl<T> MemoCell<T> {
    /// Infallible variant for derived data that cannot fail to compute.
    pub(crate) fn get_or_init(&self, f: impl FnOnce() -> T) -> &T {
        self.0.get_or_init(f)
    }
}

impl<T> Default for MemoCell<T> {
    fn default() -> Self {
        Self::new()
    }
}
