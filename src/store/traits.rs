//! `KeyValueStore` trait: the persistence contract for relay configuration.
//!
//! Only two primitives are required: a plain read and an atomic single-key
//! compare-and-set. Anything needing read-modify-write builds on those, so
//! concurrent writers never interleave into a torn value.

use async_trait::async_trait;

use crate::error::StoreError;

/// Process-durable key-value store with atomic single-key writes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the current value for `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value for `key` with `new` iff the current value equals
    /// `expected` (`None` meaning the key is absent).
    ///
    /// Returns `true` if the swap happened, `false` if another writer got
    /// there first.
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool, StoreError>;
}
