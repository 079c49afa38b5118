//! Options for a sync pass.

use crate::sync::ConflictPolicy;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Upper bound on every remote call.
    pub request_timeout: Duration,
    pub conflict_policy: ConflictPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}
