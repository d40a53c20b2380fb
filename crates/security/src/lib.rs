//! Security gate for toolgate — policy engine, canonicalization, audit
//! logging and secret redaction.
//!
//! Provides:
//! - **Policy**: allow/deny/ask rules with boundary-aware longest-prefix matching
//! - **Normalization**: canonical command strings from JSON or CLI arguments
//! - **Audit logging**: structured record of decisions and executions
//! - **Redaction**: credential scrubbing for operator-visible text

pub mod audit;
pub mod matcher;
pub mod normalize;
pub mod policy;
pub mod redact;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use matcher::matches_with_boundary;
pub use normalize::{Normalized, PAYLOAD_KEYS, normalize_args};
pub use policy::{Action, PolicyEngine, PolicyError, PolicyFile, PolicyPaths, Rule, default_rules};
pub use redact::redact_secrets;
