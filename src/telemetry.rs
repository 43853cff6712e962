//! Structured telemetry for anomalies in the sync path.
//!
//! The engine never throws out of its public API, so anomalies (a transport that refused a
//! message, a latency sample that was not a number, a delta path that ran through a scalar)
//! are reported as structured [`InvariantViolation`] values instead. By default they are logged
//! via `tracing`; tests and hosting applications can install a [`ViolationObserver`] to
//! collect or forward them.
//!
//! ```
//! use turnsync::telemetry::{CollectingObserver, ViolationKind, ViolationObserver, InvariantViolation, ViolationSeverity};
//!
//! let observer = CollectingObserver::new();
//! observer.on_violation(&InvariantViolation::new(
//!     ViolationSeverity::Warning,
//!     ViolationKind::Transport,
//!     "broadcast rejected",
//!     "router.rs:1",
//! ));
//! assert!(observer.has_violation(ViolationKind::Transport));
//! ```

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Severity of a violation, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Unexpected but recoverable - operation continued with a fallback.
    Warning,
    /// Serious issue - behavior may be degraded until the next resync.
    Error,
    /// Critical invariant broken - local state may be corrupted.
    Critical,
}

impl ViolationSeverity {
    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories of violations, one per subsystem.
///
/// Marked `#[non_exhaustive]`; always include a wildcard arm when matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// The transport rejected or failed to hand off a message.
    Transport,
    /// Applying a delta required reshaping the base state.
    ///
    /// Examples:
    /// - A path segment expected a container but found a scalar
    /// - An index segment landed on an object
    DeltaApply,
    /// A latency measurement was rejected.
    LatencySample,
    /// Local and remote checksums disagree.
    ChecksumMismatch,
    /// Pending-action bookkeeping anomaly.
    ///
    /// Examples:
    /// - Registering an id that is already pending
    /// - An action rolled back after its timeout
    ActionLifecycle,
    /// Configuration constraint violated.
    Configuration,
    /// A call was made on an engine that is not active.
    EngineLifecycle,
}

impl ViolationKind {
    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::DeltaApply => "delta_apply",
            Self::LatencySample => "latency_sample",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::ActionLifecycle => "action_lifecycle",
            Self::Configuration => "configuration",
            Self::EngineLifecycle => "engine_lifecycle",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded violation with its diagnostic context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InvariantViolation {
    /// The severity level of this violation.
    pub severity: ViolationSeverity,
    /// The subsystem where the violation occurred.
    pub kind: ViolationKind,
    /// Human-readable description of what went wrong.
    pub message: String,
    /// Source location where the violation was detected (file:line).
    pub location: &'static str,
    /// Additional structured context as key-value pairs.
    pub context: BTreeMap<String, String>,
}

impl InvariantViolation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
            context: BTreeMap::new(),
        }
    }

    /// Adds a context key-value pair.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Serializes this violation to a JSON string.
    ///
    /// ```
    /// use turnsync::telemetry::{InvariantViolation, ViolationKind, ViolationSeverity};
    ///
    /// let violation = InvariantViolation::new(
    ///     ViolationSeverity::Warning,
    ///     ViolationKind::Transport,
    ///     "send failed",
    ///     "test.rs:1",
    /// ).with_context("event", "token_move");
    ///
    /// let json = violation.to_json().unwrap();
    /// assert!(json.contains(r#""kind":"transport""#));
    /// assert!(json.contains(r#""event":"token_move""#));
    /// ```
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {} (at {}",
            self.severity, self.kind, self.message, self.location
        )?;
        if !self.context.is_empty() {
            write!(f, ", context={:?}", self.context)?;
        }
        write!(f, ")")
    }
}

/// Trait for observing violations.
#[cfg(feature = "sync-send")]
pub trait ViolationObserver: Send + Sync {
    /// Called when a violation is detected. Must be quick; it runs on the sync path.
    fn on_violation(&self, violation: &InvariantViolation);
}

/// Trait for observing violations.
#[cfg(not(feature = "sync-send"))]
pub trait ViolationObserver {
    /// Called when a violation is detected. Must be quick; it runs on the sync path.
    fn on_violation(&self, violation: &InvariantViolation);
}

/// Default observer: logs violations via `tracing` with structured fields.
///
/// `Warning` maps to `tracing::warn!`; `Error` and `Critical` map to `tracing::error!`.
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

impl TracingObserver {
    /// Creates a new tracing observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &InvariantViolation) {
        let kind = violation.kind.as_str();
        let location = violation.location;
        let context = if violation.context.is_empty() {
            "{}".to_string()
        } else {
            let pairs: Vec<String> = violation
                .context
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        };

        match violation.severity {
            ViolationSeverity::Warning => {
                tracing::warn!(
                    severity = "warning",
                    kind,
                    location,
                    context = %context,
                    "{}",
                    violation.message
                );
            },
            ViolationSeverity::Error => {
                tracing::error!(
                    severity = "error",
                    kind,
                    location,
                    context = %context,
                    "{}",
                    violation.message
                );
            },
            ViolationSeverity::Critical => {
                tracing::error!(
                    severity = "critical",
                    kind,
                    location,
                    context = %context,
                    "{}",
                    violation.message
                );
            },
        }
    }
}

/// Observer that stores every violation, for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<InvariantViolation>>,
}

impl CollectingObserver {
    /// Creates a new collecting observer with an empty violation list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            violations: Mutex::new(Vec::new()),
        }
    }

    /// Returns a copy of all collected violations.
    #[must_use]
    pub fn violations(&self) -> Vec<InvariantViolation> {
        self.violations.lock().clone()
    }

    /// Returns the number of collected violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// Returns true if no violations have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Checks if any violation of the specified kind has been collected.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.lock().iter().any(|v| v.kind == kind)
    }

    /// Returns all violations matching the specified kind.
    #[must_use]
    pub fn violations_of_kind(&self, kind: ViolationKind) -> Vec<InvariantViolation> {
        self.violations
            .lock()
            .iter()
            .filter(|v| v.kind == kind)
            .cloned()
            .collect()
    }

    /// Clears all collected violations.
    pub fn clear(&self) {
        self.violations.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &InvariantViolation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Reports a violation to an optional observer, falling back to [`TracingObserver`] if `None`.
pub fn report_to_observer<O: ViolationObserver + ?Sized>(
    observer: Option<&Arc<O>>,
    violation: &InvariantViolation,
) {
    match observer {
        Some(obs) => obs.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Reports a violation with the current file and line to the [`TracingObserver`].
///
/// ```
/// use turnsync::{report_violation, telemetry::{ViolationKind, ViolationSeverity}};
///
/// report_violation!(ViolationSeverity::Warning, ViolationKind::LatencySample,
///     "rejected latency sample {}", -3.0);
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $msg:literal) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::InvariantViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};

    ($severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::InvariantViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

/// Like [`report_violation!`], but routed through an `Option<Arc<dyn ViolationObserver>>`.
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $severity:expr, $kind:expr, $msg:literal) => {{
        let violation = $crate::telemetry::InvariantViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        let violation = $crate::telemetry::InvariantViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};
}

/// Asserts that no violations have been collected.
#[macro_export]
macro_rules! assert_no_violations {
    ($observer:expr) => {{
        let violations = $observer.violations();
        assert!(
            violations.is_empty(),
            "Expected no violations, but found {}:\n{:#?}",
            violations.len(),
            violations
        );
    }};
}

/// Asserts that a violation of the specified kind was collected.
#[macro_export]
macro_rules! assert_violation {
    ($observer:expr, $kind:expr) => {{
        assert!(
            $observer.has_violation($kind),
            "Expected violation of kind {:?}, but found: {:#?}",
            $kind,
            $observer.violations()
        );
    }};
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn sample(kind: ViolationKind) -> InvariantViolation {
        InvariantViolation::new(ViolationSeverity::Warning, kind, "test", "test.rs:1")
    }

    #[test]
    fn severity_ordering() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn collecting_observer_filters_by_kind() {
        let observer = CollectingObserver::new();
        observer.on_violation(&sample(ViolationKind::Transport));
        observer.on_violation(&sample(ViolationKind::DeltaApply));
        observer.on_violation(&sample(ViolationKind::Transport));

        assert_eq!(observer.len(), 3);
        assert_eq!(observer.violations_of_kind(ViolationKind::Transport).len(), 2);
        assert!(!observer.has_violation(ViolationKind::Configuration));

        observer.clear();
        assert!(observer.is_empty());
    }

    #[test]
    fn display_includes_context() {
        let violation = sample(ViolationKind::ChecksumMismatch).with_context("remote", "0000beef");
        let text = violation.to_string();
        assert!(text.starts_with("[warning/checksum_mismatch] test (at test.rs:1"));
        assert!(text.contains("0000beef"));
    }

    #[test]
    fn report_violation_to_uses_observer() {
        let collecting = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collecting.clone());
        report_violation_to!(
            &observer,
            ViolationSeverity::Error,
            ViolationKind::Transport,
            "send failed: {}",
            "closed"
        );
        assert_violation!(collecting, ViolationKind::Transport);
        assert_eq!(collecting.violations()[0].message, "send failed: closed");
    }

    #[test]
    fn report_violation_to_none_falls_back_to_tracing() {
        let observer: Option<Arc<dyn ViolationObserver>> = None;
        report_violation_to!(
            &observer,
            ViolationSeverity::Warning,
            ViolationKind::EngineLifecycle,
            "engine inactive"
        );
    }
}
