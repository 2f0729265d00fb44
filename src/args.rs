//! "One item or many" argument normalisation.
//!
//! APIs that accept either a bare item or a collection take `impl Into<OneOrMany<T>>`.
//! A bare item and a singleton collection are treated identically; an explicitly
//! empty collection is rejected with [`Error::EmptyArgument`].

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Flatten into a non-empty `Vec`.
    ///
    /// # Errors
    /// Returns [`Error::EmptyArgument`] for `Many(vec![])`.
    pub fn into_vec(self, context: &str) -> Result<Vec<T>> {
        match self {
            Self::One(item) => Ok(vec![item]),
            Self::Many(items) if items.is_empty() => Err(Error::EmptyArgument {
                context: context.to_string(),
            }),
            Self::Many(items) => Ok(items),
        }
    }

    /// Number of items carried.
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> From<T> for OneOrMany<T> {
    fn from(item: T) -> Self {
        Self::One(item)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        Self::Many(items)
    }
}

impl<T: Clone> From<&[T]> for OneOrMany<T> {
    fn from(items: &[T]) -> Self {
        Self::Many(items.to_vec())
    }
}
