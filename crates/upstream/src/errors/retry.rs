/// Classification of a non-successful attempt.
///
/// Used by the coordinator's attempt loop to decide whether to retry,
/// whether to persist a cooldown, and which error to surface.
///
/// # Behavior Summary
///
/// | Class | Retry? | Write BackoffRecord? | Final error |
/// |-------|--------|----------------------|-------------|
/// | `Throttled` | Yes, if the delay fits the wait budget | Yes | `RetriesExhausted` |
/// | `Transient` | Yes | No | `RetriesExhausted` / `NetworkOrDnsFailure` |
/// | `Unreachable` | No | No | `NetworkOrDnsFailure` |
/// | `Never` | No | No | `UpstreamHttpError` |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// HTTP 429. The resource is throttled and the cooldown is shared
    /// with later requests through the backoff store.
    Throttled,

    /// Server errors and transport failures (DNS, connect, timeout).
    /// Assumed to be per-call and transient, so nothing is persisted.
    Transient,

    /// The edge in front of the upstream reports the origin as down.
    /// Retrying inside the same call cannot help.
    Unreachable,

    /// Any other non-success status. The request itself is wrong.
    Never,
}

/// Edge statuses meaning the origin could not be reached at all.
const UNREACHABLE_STATUSES: &[u16] = &[521, 522, 523, 530];

/// Classifies an HTTP status. Returns `None` for 2xx.
pub fn classify_status(status: u16) -> Option<RetryClass> {
    match status {
        200..=299 => None,
        429 => Some(RetryClass::Throttled),
        s if UNREACHABLE_STATUSES.contains(&s) => Some(RetryClass::Unreachable),
        500..=599 => Some(RetryClass::Transient),
        _ => Some(RetryClass::Never),
    }
}
