//! Callback surface shared by points, stations, connections, and the server.
//!
//! Callbacks are plain boxed closures (no embedded-interpreter GIL to
//! acquire, per §9's design note). The engine contract, also from §9 and
//! §7, is: no engine-owned lock is held while a callback runs, and a
//! callback's own panic is caught at the invocation site and treated as
//! `ResponseState::Failure` (commands) or a no-op (notifications) — it never
//! propagates and tears down the engine.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Outcome of a callback that participates in a command's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseState {
    /// The callback explicitly approved the operation.
    Success,
    /// The callback explicitly rejected the operation.
    Failure,
    /// The callback did not decide; the engine's own default applies.
    #[default]
    None,
}

impl ResponseState {
    /// True if this resolves to a positive confirmation.
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// A boxed, thread-safe callback.
pub type Callback<Args, Out> = Arc<dyn Fn(Args) -> Out + Send + Sync>;

/// Invoke a fallible callback slot, catching panics per the §7/§9 contract.
/// `on_panic` supplies the fallback return value when the callback panics.
pub fn invoke_guarded<Args, Out>(
    slot: &Option<Callback<Args, Out>>,
    args: Args,
    on_panic: Out,
) -> Out
where
    Out: Clone,
{
    match slot {
        None => on_panic,
        Some(f) => match catch_unwind(AssertUnwindSafe(|| f(args))) {
            Ok(out) => out,
            Err(_) => on_panic,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_guarded_returns_fallback_when_empty() {
        let slot: Option<Callback<(), ResponseState>> = None;
        assert_eq!(
            invoke_guarded(&slot, (), ResponseState::Failure),
            ResponseState::Failure
        );
    }

    #[test]
    fn invoke_guarded_catches_panics() {
        let slot: Option<Callback<(), ResponseState>> =
            Some(Arc::new(|_| panic!("boom")));
        assert_eq!(
            invoke_guarded(&slot, (), ResponseState::Failure),
            ResponseState::Failure
        );
    }

    #[test]
    fn invoke_guarded_returns_callback_result() {
        let slot: Option<Callback<(), ResponseState>> =
            Some(Arc::new(|_| ResponseState::Success));
        assert_eq!(
            invoke_guarded(&slot, (), ResponseState::Failure),
            ResponseState::Success
        );
    }
}
