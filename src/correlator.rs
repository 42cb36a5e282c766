//! Command correlator: resolves outbound commands/interrogations against
//! inbound activation confirmations and terminations.
//!
//! Replaces the teacher's inline "match the next ASDU's COT" logic in
//! `client.rs::process_asdu` with a keyed table, so overlapping commands on
//! distinct `(ca, type, ioa)` keys resolve independently. Grounded on the
//! `expected`/`PendingCommand` state table carried into SPEC_FULL.md §4.7.

use std::collections::HashMap;
use std::time::Instant;

use crate::types::{Cot, Ioa, TypeId};

/// Common address wildcard meaning "any station responds", used as a
/// shadow key when the original command targeted CA=65535.
pub const GLOBAL_CA: u16 = 65535;

/// Key identifying one pending command: common address, type id, and
/// information object address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandKey {
    /// Common address.
    pub ca: u16,
    /// Type id of the command.
    pub type_id: TypeId,
    /// Information object address.
    pub ioa: Ioa,
}

impl CommandKey {
    /// Construct a key.
    pub const fn new(ca: u16, type_id: TypeId, ioa: Ioa) -> Self {
        Self { ca, type_id, ioa }
    }

    /// The shadow key used when this command was addressed to the
    /// broadcast common address, matched against any responding station.
    pub const fn global_shadow(self) -> Self {
        Self {
            ca: GLOBAL_CA,
            type_id: self.type_id,
            ioa: self.ioa,
        }
    }
}

/// What kind of acknowledgment sequence a pending command expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// A single ACT_CON resolves the command.
    AwaitCon,
    /// A balanced run of ACT_CON/ACT_TERM resolves the command, tracked by
    /// `con_count`.
    AwaitConTerm,
    /// A single ACT_TERM resolves the command (no CON expected first).
    AwaitTerm,
    /// Either an ACT_CON or a REQUEST-caused reply resolves the command.
    AwaitRequest,
}

/// Resolution of a pending command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Still waiting.
    Pending,
    /// Resolved positively.
    Success,
    /// Resolved negatively (negative P/N bit, timeout, or a COT the state
    /// table does not accept).
    Failure,
}

/// One entry in the correlator's table.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    expected: Expected,
    con_count: i32,
    outcome: Outcome,
    deadline: Instant,
}

impl PendingCommand {
    /// Start tracking a command that must resolve by `deadline`.
    pub const fn new(expected: Expected, deadline: Instant) -> Self {
        Self {
            expected,
            con_count: 0,
            outcome: Outcome::Pending,
            deadline,
        }
    }

    /// Current outcome.
    pub const fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Deadline by which this command must resolve or be timed out.
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Advance the state machine on an inbound ASDU matching this key, per
    /// §4.7's table. `negative` is the ASDU's P/N bit.
    fn advance(&mut self, cot: Cot, negative: bool) {
        if self.outcome != Outcome::Pending {
            return;
        }
        if negative {
            self.outcome = Outcome::Failure;
            return;
        }
        self.outcome = match self.expected {
            Expected::AwaitCon => match cot {
                Cot::ActivationConfirm => Outcome::Success,
                _ => Outcome::Failure,
            },
            Expected::AwaitConTerm => match cot {
                Cot::ActivationConfirm => {
                    self.con_count += 1;
                    Outcome::Pending
                }
                Cot::ActivationTermination => {
                    self.con_count -= 1;
                    if self.con_count == 0 {
                        Outcome::Success
                    } else if self.con_count < 0 {
                        Outcome::Failure
                    } else {
                        Outcome::Pending
                    }
                }
                _ => Outcome::Failure,
            },
            Expected::AwaitTerm => match cot {
                Cot::ActivationTermination => Outcome::Success,
                _ => Outcome::Failure,
            },
            Expected::AwaitRequest => match cot {
                Cot::ActivationConfirm | Cot::Request => Outcome::Success,
                _ => Outcome::Failure,
            },
        };
    }
}

/// The keyed table of in-flight commands for one connection or server
/// session.
#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<CommandKey, PendingCommand>,
}

impl Correlator {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending command. A prior entry at the same key, if
    /// still pending, is silently replaced (the caller is expected to have
    /// already timed it out; commands on the same key do not pipeline).
    pub fn register(&mut self, key: CommandKey, expected: Expected, deadline: Instant) {
        self.pending.insert(key, PendingCommand::new(expected, deadline));
    }

    /// Feed an inbound ASDU's `(ca, type_id, ioa, cot, negative)` to the
    /// table, advancing whichever pending command matches — trying the
    /// exact key first, then the CA=65535 global shadow key.
    pub fn observe(&mut self, ca: u16, type_id: TypeId, ioa: Ioa, cot: Cot, negative: bool) {
        let key = CommandKey::new(ca, type_id, ioa);
        if let Some(pending) = self.pending.get_mut(&key) {
            pending.advance(cot, negative);
            return;
        }
        let shadow = CommandKey::new(GLOBAL_CA, type_id, ioa);
        if let Some(pending) = self.pending.get_mut(&shadow) {
            pending.advance(cot, negative);
        }
    }

    /// Current outcome for `key`, if tracked.
    pub fn outcome(&self, key: CommandKey) -> Option<Outcome> {
        self.pending.get(&key).map(|p| p.outcome())
    }

    /// Remove and return a resolved (non-`Pending`) entry, if any.
    pub fn take_resolved(&mut self, key: CommandKey) -> Option<PendingCommand> {
        match self.pending.get(&key) {
            Some(p) if p.outcome() != Outcome::Pending => self.pending.remove(&key),
            _ => None,
        }
    }

    /// Expire every entry whose deadline has passed, returning their keys
    /// so the caller can resolve the corresponding waiter to `Failure`.
    pub fn expire(&mut self, now: Instant) -> Vec<CommandKey> {
        let expired: Vec<CommandKey> = self
            .pending
            .iter()
            .filter(|(_, p)| p.outcome == Outcome::Pending && now >= p.deadline)
            .map(|(k, _)| *k)
            .collect();
        for key in &expired {
            self.pending.remove(key);
        }
        expired
    }

    /// Number of in-flight commands.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if no commands are in flight.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ioa: u32) -> CommandKey {
        CommandKey::new(1, TypeId::SingleCommand, Ioa::new(ioa))
    }

    #[test]
    fn await_con_resolves_on_act_con() {
        let mut correlator = Correlator::new();
        let deadline = Instant::now() + std::time::Duration::from_secs(10);
        correlator.register(key(1), Expected::AwaitCon, deadline);
        correlator.observe(1, TypeId::SingleCommand, Ioa::new(1), Cot::ActivationConfirm, false);
        assert_eq!(correlator.outcome(key(1)), Some(Outcome::Success));
    }

    #[test]
    fn await_con_fails_on_unexpected_cot() {
        let mut correlator = Correlator::new();
        let deadline = Instant::now() + std::time::Duration::from_secs(10);
        correlator.register(key(1), Expected::AwaitCon, deadline);
        correlator.observe(1, TypeId::SingleCommand, Ioa::new(1), Cot::Spontaneous, false);
        assert_eq!(correlator.outcome(key(1)), Some(Outcome::Failure));
    }

    #[test]
    fn negative_bit_always_fails() {
        let mut correlator = Correlator::new();
        let deadline = Instant::now() + std::time::Duration::from_secs(10);
        correlator.register(key(1), Expected::AwaitCon, deadline);
        correlator.observe(1, TypeId::SingleCommand, Ioa::new(1), Cot::ActivationConfirm, true);
        assert_eq!(correlator.outcome(key(1)), Some(Outcome::Failure));
    }

    #[test]
    fn await_con_term_balances_con_and_term() {
        let mut correlator = Correlator::new();
        let deadline = Instant::now() + std::time::Duration::from_secs(10);
        correlator.register(key(20), Expected::AwaitConTerm, deadline);
        correlator.observe(1, TypeId::SingleCommand, Ioa::new(20), Cot::ActivationConfirm, false);
        assert_eq!(correlator.outcome(key(20)), Some(Outcome::Pending));
        correlator.observe(1, TypeId::SingleCommand, Ioa::new(20), Cot::ActivationTermination, false);
        assert_eq!(correlator.outcome(key(20)), Some(Outcome::Success));
    }

    #[test]
    fn await_con_term_underflow_fails() {
        let mut correlator = Correlator::new();
        let deadline = Instant::now() + std::time::Duration::from_secs(10);
        correlator.register(key(20), Expected::AwaitConTerm, deadline);
        correlator.observe(1, TypeId::SingleCommand, Ioa::new(20), Cot::ActivationTermination, false);
        assert_eq!(correlator.outcome(key(20)), Some(Outcome::Failure));
    }

    #[test]
    fn global_ca_shadow_key_matches() {
        let mut correlator = Correlator::new();
        let deadline = Instant::now() + std::time::Duration::from_secs(10);
        let k = CommandKey::new(GLOBAL_CA, TypeId::SingleCommand, Ioa::new(1));
        correlator.register(k, Expected::AwaitCon, deadline);
        // Station 7 answers a command originally addressed to the broadcast CA.
        correlator.observe(7, TypeId::SingleCommand, Ioa::new(1), Cot::ActivationConfirm, false);
        assert_eq!(correlator.outcome(k), Some(Outcome::Success));
    }

    #[test]
    fn expire_removes_past_deadline_entries() {
        let mut correlator = Correlator::new();
        let now = Instant::now();
        correlator.register(key(1), Expected::AwaitCon, now);
        let expired = correlator.expire(now + std::time::Duration::from_millis(1));
        assert_eq!(expired, vec![key(1)]);
        assert!(correlator.is_empty());
    }

    #[test]
    fn await_request_accepts_con_or_request_cot() {
        let mut correlator = Correlator::new();
        let deadline = Instant::now() + std::time::Duration::from_secs(10);
        correlator.register(key(1), Expected::AwaitRequest, deadline);
        correlator.observe(1, TypeId::SingleCommand, Ioa::new(1), Cot::Request, false);
        assert_eq!(correlator.outcome(key(1)), Some(Outcome::Success));
    }
}
