//! Error classification.
//!
//! # Responsibilities
//! - Map a raised error to a category, severity and recoverability flag
//! - Drive retry and fallback eligibility only; never alter the error itself
//!
//! # Design Decisions
//! - Pattern-based on the error message (operations are opaque)
//! - Walks the `source()` chain so wrapped errors classify like their cause
//! - First match wins: timeout, socket errno, auth, network, throttling,
//!   exhaustion, validation
//! - Status codes only match as whole tokens, so ports and ids never do
//! - Unmatched errors are `system` and not recoverable
//! - Pure and allocation-light; recomputed per error instance, never cached

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RecoveryError;

/// Broad failure family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Network,
    Timeout,
    Auth,
    Validation,
    System,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Validation => "validation",
            ErrorCategory::System => "system",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad an error is for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Low => "low",
            ErrorSeverity::Medium => "medium",
            ErrorSeverity::High => "high",
            ErrorSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub is_recoverable: bool,
}

impl ErrorClassification {
    const fn new(category: ErrorCategory, severity: ErrorSeverity, is_recoverable: bool) -> Self {
        Self {
            category,
            severity,
            is_recoverable,
        }
    }
}

const TIMEOUT_PATTERNS: &[&str] = &[
    "etimedout",
    "timed out",
    "timeout",
    "deadline exceeded",
    "esockettimedout",
];

const NETWORK_ERRNO_PATTERNS: &[&str] = &[
    "econnrefused",
    "econnreset",
    "econnaborted",
    "enotfound",
    "eai_again",
    "ehostunreach",
    "enetunreach",
    "epipe",
];

const AUTH_CODES: &[&str] = &["401", "403"];

const AUTH_PATTERNS: &[&str] = &[
    "unauthorized",
    "unauthorised",
    "forbidden",
    "authentication",
    "invalid token",
    "invalid api key",
    "permission denied",
    "access denied",
];

const NETWORK_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection closed",
    "broken pipe",
    "socket hang up",
    "dns",
    "network",
];

const THROTTLE_CODES: &[&str] = &["429", "503"];

const THROTTLE_PATTERNS: &[&str] = &[
    "rate limit",
    "too many requests",
    "service unavailable",
    "temporarily unavailable",
    "try again",
];

const EXHAUSTION_PATTERNS: &[&str] = &["out of memory", "enomem", "enospc", "no space left"];

const VALIDATION_CODES: &[&str] = &["400"];

const VALIDATION_PATTERNS: &[&str] = &[
    "validation",
    "invalid",
    "malformed",
    "schema",
    "bad request",
    "parse error",
];

const TIMEOUT: ErrorClassification =
    ErrorClassification::new(ErrorCategory::Timeout, ErrorSeverity::Medium, true);
const AUTH: ErrorClassification =
    ErrorClassification::new(ErrorCategory::Auth, ErrorSeverity::High, false);
const NETWORK: ErrorClassification =
    ErrorClassification::new(ErrorCategory::Network, ErrorSeverity::Medium, true);
const THROTTLED: ErrorClassification =
    ErrorClassification::new(ErrorCategory::System, ErrorSeverity::Medium, true);
const EXHAUSTED: ErrorClassification =
    ErrorClassification::new(ErrorCategory::System, ErrorSeverity::Critical, false);
const VALIDATION: ErrorClassification =
    ErrorClassification::new(ErrorCategory::Validation, ErrorSeverity::Low, false);
const CIRCUIT_OPEN: ErrorClassification =
    ErrorClassification::new(ErrorCategory::System, ErrorSeverity::High, true);
const UNKNOWN: ErrorClassification =
    ErrorClassification::new(ErrorCategory::Unknown, ErrorSeverity::Low, false);
const SYSTEM: ErrorClassification =
    ErrorClassification::new(ErrorCategory::System, ErrorSeverity::Medium, false);

/// Classify an error, looking through its source chain.
pub fn classify(error: &(dyn Error + 'static)) -> ErrorClassification {
    let mut current: Option<&(dyn Error + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(RecoveryError::CircuitOpen { .. }) = err.downcast_ref::<RecoveryError>() {
            return CIRCUIT_OPEN;
        }
        current = err.source();
    }

    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    classify_message(&message)
}

/// Classify an error message.
pub fn classify_message(message: &str) -> ErrorClassification {
    let lower = message.trim().to_ascii_lowercase();
    if lower.is_empty() {
        return UNKNOWN;
    }

    let matches = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));
    let has_code = |codes: &[&str]| {
        lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| codes.contains(&token))
    };

    if matches(TIMEOUT_PATTERNS) {
        TIMEOUT
    } else if matches(NETWORK_ERRNO_PATTERNS) {
        NETWORK
    } else if has_code(AUTH_CODES) || matches(AUTH_PATTERNS) {
        AUTH
    } else if matches(NETWORK_PATTERNS) {
        NETWORK
    } else if has_code(THROTTLE_CODES) || matches(THROTTLE_PATTERNS) {
        THROTTLED
    } else if matches(EXHAUSTION_PATTERNS) {
        EXHAUSTED
    } else if has_code(VALIDATION_CODES) || matches(VALIDATION_PATTERNS) {
        VALIDATION
    } else {
        SYSTEM
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;

    #[test]
    fn test_network_errors() {
        let c = classify_message("connect ECONNREFUSED 127.0.0.1:8080");
        assert_eq!(c.category, ErrorCategory::Network);
        assert!(c.is_recoverable);

        let c = classify_message("getaddrinfo ENOTFOUND api.example.com");
        assert_eq!(c.category, ErrorCategory::Network);
    }

    #[test]
    fn test_timeout_beats_network() {
        let c = classify_message("network request timed out after 30s");
        assert_eq!(c.category, ErrorCategory::Timeout);
        assert!(c.is_recoverable);
    }

    #[test]
    fn test_auth_not_recoverable() {
        for msg in ["HTTP 401", "403 Forbidden", "Unauthorized", "invalid token supplied"] {
            let c = classify_message(msg);
            assert_eq!(c.category, ErrorCategory::Auth, "{}", msg);
            assert!(!c.is_recoverable);
            assert_eq!(c.severity, ErrorSeverity::High);
        }
    }

    #[test]
    fn test_status_codes_match_whole_tokens_only() {
        for msg in [
            "connect ECONNREFUSED 10.0.0.5:4013",
            "connect ECONNREFUSED 127.0.0.1:401",
            "read ECONNRESET (request id 4031-a)",
            "socket hang up while calling node-1403",
        ] {
            let c = classify_message(msg);
            assert_eq!(c.category, ErrorCategory::Network, "{}", msg);
            assert!(c.is_recoverable, "{}", msg);
        }

        assert_eq!(classify_message("job 14290 failed").category, ErrorCategory::System);
        assert!(!classify_message("job 5030 failed").is_recoverable);
        assert_eq!(classify_message("record 4001 rejected").category, ErrorCategory::System);
        assert_eq!(classify_message("status=401").category, ErrorCategory::Auth);
    }

    #[test]
    fn test_validation_errors() {
        let c = classify_message("schema validation failed: missing field `name`");
        assert_eq!(c.category, ErrorCategory::Validation);
        assert!(!c.is_recoverable);
    }

    #[test]
    fn test_throttling_is_recoverable_system() {
        let c = classify_message("429 Too Many Requests");
        assert_eq!(c.category, ErrorCategory::System);
        assert!(c.is_recoverable);
    }

    #[test]
    fn test_default_is_system_not_recoverable() {
        let c = classify_message("something odd happened");
        assert_eq!(c.category, ErrorCategory::System);
        assert!(!c.is_recoverable);

        let c = classify_message("   ");
        assert_eq!(c.category, ErrorCategory::Unknown);
    }

    #[test]
    fn test_exhaustion_is_critical() {
        let c = classify_message("write failed: No space left on device");
        assert_eq!(c.severity, ErrorSeverity::Critical);
        assert!(!c.is_recoverable);
    }

    #[test]
    fn test_circuit_open_classified_structurally() {
        let err = RecoveryError::CircuitOpen {
            key: "strategy:api".to_string(),
        };
        let c = classify(&err);
        assert_eq!(c.category, ErrorCategory::System);
        assert!(c.is_recoverable);
    }

    #[test]
    fn test_source_chain_is_considered() {
        let inner: BoxError = "connection reset by peer".into();
        let err = RecoveryError::Fallback(inner);
        assert_eq!(classify(&err).category, ErrorCategory::Network);

        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "operation timed out");
        assert_eq!(classify(&io).category, ErrorCategory::Timeout);
    }
}
