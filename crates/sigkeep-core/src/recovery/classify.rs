//! Error classification.
//!
//! The pairwise engine reports failures as text, so classification is a
//! substring match against a rule table. Unknown text is never recoverable.

use crate::error::EngineError;

/// What went wrong, as far as recovery is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Message authentication failed; the session is out of sync
    MacError,
    /// The session is missing or unusable
    SessionRecordError,
    /// Anything else
    Other,
}

/// Verdict on one engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Clearing the session and retrying may succeed
    pub recoverable: bool,
    /// Failure category
    pub kind: FailureKind,
}

impl Classification {
    /// Classification for `kind`. Only `Other` is unrecoverable.
    pub fn of(kind: FailureKind) -> Self {
        Self { recoverable: kind != FailureKind::Other, kind }
    }
}

/// Decides whether an engine failure can be repaired.
pub trait ErrorClassifier: Send + Sync {
    /// Classify `error`.
    fn classify(&self, error: &EngineError) -> Classification;
}

/// One substring rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    /// Text to look for in the engine message
    pub pattern: String,
    /// Kind assigned on match
    pub kind: FailureKind,
}

impl ClassificationRule {
    /// Rule mapping `pattern` to `kind`.
    pub fn new(pattern: impl Into<String>, kind: FailureKind) -> Self {
        Self { pattern: pattern.into(), kind }
    }
}

/// Substring rule table.
///
/// MAC rules take precedence over session-record rules when both match.
/// Store failures are always `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationTable {
    rules: Vec<ClassificationRule>,
}

const SESSION_RECORD_PATTERNS: &[&str] = &[
    "No session record",
    "SessionError: No session record",
    "No matching sessions",
    "No session found",
];

const MAC_PATTERNS: &[&str] = &["Bad MAC", "MAC verification failed", "Bad MAC Error"];

impl ClassificationTable {
    /// Table with exactly `rules`.
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    /// Add a rule.
    #[must_use]
    pub fn with_rule(mut self, pattern: impl Into<String>, kind: FailureKind) -> Self {
        self.rules.push(ClassificationRule::new(pattern, kind));
        self
    }

    /// Configured rules.
    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Classify a raw engine message.
    pub fn classify_message(&self, message: &str) -> Classification {
        let matches = |kind| {
            self.rules.iter().any(|rule| rule.kind == kind && message.contains(&rule.pattern))
        };

        let kind = if matches(FailureKind::MacError) {
            FailureKind::MacError
        } else if matches(FailureKind::SessionRecordError) {
            FailureKind::SessionRecordError
        } else {
            FailureKind::Other
        };

        Classification::of(kind)
    }
}

impl Default for ClassificationTable {
    fn default() -> Self {
        let session = SESSION_RECORD_PATTERNS
            .iter()
            .map(|p| ClassificationRule::new(*p, FailureKind::SessionRecordError));
        let mac = MAC_PATTERNS.iter().map(|p| ClassificationRule::new(*p, FailureKind::MacError));

        Self::new(session.chain(mac).collect())
    }
}

impl ErrorClassifier for ClassificationTable {
    fn classify(&self, error: &EngineError) -> Classification {
        match error {
            EngineError::Protocol(message) => self.classify_message(message),
            EngineError::Store(_) => Classification::of(FailureKind::Other),
        }
    }
}
