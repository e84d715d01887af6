pub mod health;
pub mod ingest;
pub mod public;

use keymeter_core::error::UsageError;
use keymeter_core::keys::KeyLookupError;

/// Key store failures are reported to the caller as "not found"; the
/// backend error itself only goes to the log.
pub(crate) fn lookup_failure(err: KeyLookupError) -> UsageError {
    if let KeyLookupError::Backend(ref reason) = err {
        tracing::warn!(error = %reason, "Key lookup failed");
    }
    UsageError::KeyNotFound
}
