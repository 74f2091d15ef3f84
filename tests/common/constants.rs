//! Shared constants for end-to-end tests
//!
//! When fixture documents change, update only this file.

// ============================================================================
// Fixture Documents
// ============================================================================

/// Content id of an English plain-text document
pub const DOC_EN_ID: &str = "bafyEnglishNotes";

/// Text of the English document
pub const DOC_EN_TEXT: &str = "Meeting notes about the release plan";

/// Content id of a French plain-text document
pub const DOC_FR_ID: &str = "bafyFrenchNotes";

/// Text of the French document
pub const DOC_FR_TEXT: &str = "bonjour, voici le compte rendu";

/// Content id the fixture content store does not know
pub const MISSING_DOC_ID: &str = "bafyMissing";

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for the server to accept requests
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// HTTP request timeout
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Delay between readiness checks
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Maximum time to wait for a job to reach a status
pub const JOB_STATUS_TIMEOUT_MS: u64 = 5000;

/// Delay between status polls
pub const JOB_STATUS_POLL_INTERVAL_MS: u64 = 20;
