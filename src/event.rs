//! Diagnostic events: warnings are emitted via a pluggable reporter and never thrown as errors.
//! A plain enum describes notable things that happen during cache operation, paired with
//! structured `tracing` emission so embedders can either subscribe a `tracing::Subscriber` or
//! register a programmatic listener.

use std::fmt;

/// A notable occurrence during cache operation, passed to the configured event listener (if
/// any) and always also emitted through `tracing`.
#[derive(Debug)]
pub struct Event {
    pub kind: EventKind,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Event { kind }
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum EventKind {
    /// A required field was missing but the matcher that produced it was only `Heuristic`, so
    /// the gap is tolerable rather than fatal.
    TolerableMissingField { path: String },
    /// The writer found a result with no excluding directive missing a field the query
    /// requested: recoverable, logged, and merge proceeds.
    WriterMissingField { path: String },
    /// A deprecated configuration key was supplied.
    DeprecatedConfig { key: &'static str },
    /// A memoized sub-computation was reused without rerunning its body.
    DidReuseMemoizedValue { description: String },
    /// A watch callback panicked; the cache isolated it via `catch_unwind` so sibling watches
    /// still receive their broadcast.
    WatchCallbackPanicked { description: String },
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::TolerableMissingField { path } => {
                write!(f, "tolerable missing field at `{path}` (heuristic fragment match)")
            }
            EventKind::WriterMissingField { path } => {
                write!(f, "writer: result missing field at `{path}`")
            }
            EventKind::DeprecatedConfig { key } => write!(f, "deprecated config key `{key}`"),
            EventKind::DidReuseMemoizedValue { description } => {
                write!(f, "reused memoized value: {description}")
            }
            EventKind::WatchCallbackPanicked { description } => {
                write!(f, "watch callback panicked: {description}")
            }
        }
    }
}

/// A pluggable reporter for [`Event`]s. The default no-op listener still logs
/// every event through `tracing::warn!`/`trace!` as appropriate, so nothing is silently dropped
/// even when no listener is registered.
pub trait EventListener {
    fn on_event(&self, event: &Event);
}

pub(crate) fn report(listener: Option<&dyn EventListener>, event: Event) {
    match &event.kind {
        EventKind::WriterMissingField { .. } | EventKind::WatchCallbackPanicked { .. } => {
            tracing::warn!(target: "normalized_cache", "{}", event.kind);
        }
        _ => {
            tracing::trace!(target: "normalized_cache", "{}", event.kind);
        }
    }
    if let Some(listener) = listener {
        listener.on_event(&event);
    }
}
