//! Core type definitions: vector identifiers and cancellation tokens.
//!
//! [`VectorId`] uses UUID v7 for time-ordered unique identification. The nil
//! UUID is reserved as the "no child" sentinel in the index file format and
//! must never be assigned to a live vector.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a vector (UUID v7 for time-ordering).
///
/// Identity is stable across save/load cycles and is the only valid
/// cross-reference key between indexes and the vector collection.
///
/// # Example
/// ```
/// use vicinity::VectorId;
///
/// let id = VectorId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VectorId(pub Uuid);

impl VectorId {
    /// Creates a new VectorId with a UUID v7 (time-ordered).
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates the nil (all zeros) VectorId.
    ///
    /// The nil id is the persistence sentinel for "no child" in index
    /// files; it never identifies a live vector.
    #[inline]
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Returns true if this is the nil sentinel.
    #[inline]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Returns the raw UUID bytes for storage.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Creates a VectorId from raw bytes.
    #[inline]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for VectorId {
    /// Returns the nil VectorId.
    ///
    /// For a new unique ID, use [`VectorId::new()`].
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cooperative cancellation signal for load/save operations.
///
/// Cloning produces another handle to the same flag. The database combines a
/// caller-supplied token with its own disposal-linked token so in-flight
/// operations abort promptly when the database is being dropped.
///
/// # Example
/// ```
/// use vicinity::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// assert!(!token.is_cancelled());
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a new, un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. All clones observe the request.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Checks a caller token combined with the disposal-linked token.
///
/// Returns `Err(Cancelled)` if either has been triggered.
pub(crate) fn check_cancelled(
    caller: Option<&CancellationToken>,
    linked: &CancellationToken,
) -> crate::error::Result<()> {
    if linked.is_cancelled() || caller.is_some_and(CancellationToken::is_cancelled) {
        return Err(crate::error::VicinityError::Cancelled);
    }
    Ok(())
}
