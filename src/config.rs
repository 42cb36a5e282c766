//! Shared configuration types: APCI windowing parameters, command mode,
//! the client bootstrap policy, and the debug bitset — all construction-time
//! validated per §7's "configuration errors surface synchronously" policy.

use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Default IEC 104 TCP port.
pub const DEFAULT_PORT: u16 = 2404;

/// `k`: max unacknowledged outbound I-frames.
pub const DEFAULT_K: u16 = 12;
/// `w`: inbound I-frames before an S-frame is emitted.
pub const DEFAULT_W: u16 = 8;
/// `t0`: connection establishment timeout.
pub const DEFAULT_T0: Duration = Duration::from_secs(30);
/// `t1`: timeout waiting for an acknowledgment.
pub const DEFAULT_T1: Duration = Duration::from_secs(15);
/// `t2`: max delay before acknowledging with an S-frame.
pub const DEFAULT_T2: Duration = Duration::from_secs(10);
/// `t3`: idle interval before a TESTFR is sent.
pub const DEFAULT_T3: Duration = Duration::from_secs(20);
/// Default command resolution timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
/// Default select-and-execute selection lifetime.
pub const DEFAULT_SELECT_TIMEOUT: Duration = Duration::from_millis(100);
/// Minimum tick rate accepted by the scheduler.
pub const MIN_TICK_RATE: Duration = Duration::from_millis(50);

/// APCI windowing and timer parameters shared by client connections and
/// server sessions, per §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApciParameters {
    /// Max unacknowledged outbound I-frames.
    pub k: u16,
    /// Inbound I-frames received before an S-frame is emitted.
    pub w: u16,
    /// Connection establishment timeout.
    pub t0: Duration,
    /// Send-acknowledgment timeout.
    pub t1: Duration,
    /// Receive-acknowledgment timeout.
    pub t2: Duration,
    /// Idle/keepalive timeout.
    pub t3: Duration,
}

impl Default for ApciParameters {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            w: DEFAULT_W,
            t0: DEFAULT_T0,
            t1: DEFAULT_T1,
            t2: DEFAULT_T2,
            t3: DEFAULT_T3,
        }
    }
}

impl ApciParameters {
    /// Validate `w ≤ ⅔k` and `t2 < t1`, per §4.1.
    pub fn validate(&self) -> Result<()> {
        if self.w as u32 * 3 > self.k as u32 * 2 {
            return Err(ConfigError::WindowThresholdTooLarge {
                k: self.k,
                w: self.w,
            }
            .into());
        }
        if self.t2 >= self.t1 {
            return Err(ConfigError::T2NotLessThanT1 {
                t2_ms: self.t2.as_millis() as u64,
                t1_ms: self.t1.as_millis() as u64,
            }
            .into());
        }
        Ok(())
    }
}

/// Client connection-bootstrap policy, run once STARTDT_CON arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Init {
    /// Interrogation then clock sync.
    #[default]
    All,
    /// General interrogation only.
    Interrogation,
    /// Clock sync only.
    ClockSync,
    /// No bootstrap traffic.
    None,
    /// Connection starts muted (hot-standby redundancy); never sends
    /// STARTDT_ACT automatically.
    Muted,
}

/// Command transmission mode for a control-direction `DataPoint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandMode {
    /// Command applies immediately on receipt.
    #[default]
    Direct,
    /// Requires a select (S=1) before an execute (S=0) within
    /// `select_timeout_ms`.
    SelectAndExecute,
}

/// Debug bitset, mirroring the teacher's `Debug` flags — purely advisory,
/// consulted only by tracing spans when the `tracing-support` feature is
/// enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugFlags(u16);

impl DebugFlags {
    /// No debug output.
    pub const NONE: Self = Self(0);
    /// Server engine.
    pub const SERVER: Self = Self(1 << 0);
    /// Client engine.
    pub const CLIENT: Self = Self(1 << 1);
    /// Connection state machine.
    pub const CONNECTION: Self = Self(1 << 2);
    /// Station.
    pub const STATION: Self = Self(1 << 3);
    /// DataPoint.
    pub const POINT: Self = Self(1 << 4);
    /// Raw message bytes.
    pub const MESSAGE: Self = Self(1 << 5);
    /// Callback invocation.
    pub const CALLBACK: Self = Self(1 << 6);
    /// Reserved for parity with the teacher's GIL-tracing flag; unused in
    /// this callback model (no interpreter lock exists to trace).
    pub const GIL: Self = Self(1 << 7);
    /// Every flag set.
    pub const ALL: Self = Self(0x00FF);

    /// Combine flags.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Test whether `flag` is set.
    pub const fn contains(self, flag: Self) -> bool {
        (self.0 & flag.0) == flag.0
    }
}

/// Validate a tick rate against the §6 floor (≥50ms).
pub fn validate_tick_rate(tick_rate: Duration) -> Result<()> {
    if tick_rate < MIN_TICK_RATE {
        return Err(ConfigError::TimeoutOutOfBounds {
            name: "tick_rate_ms",
            value_ms: tick_rate.as_millis() as u64,
        }
        .into());
    }
    Ok(())
}

/// Validate a command timeout against the §6 floor (≥1ms).
pub fn validate_command_timeout(timeout: Duration) -> Result<()> {
    if timeout < Duration::from_millis(1) {
        return Err(ConfigError::TimeoutOutOfBounds {
            name: "command_timeout_ms",
            value_ms: timeout.as_millis() as u64,
        }
        .into());
    }
    Ok(())
}

/// Validate `max_open_connections` against the §6 enumerated range: 0 (no
/// limit) or 1..=255.
pub fn validate_max_open_connections(value: u16) -> Result<()> {
    if value > 255 {
        return Err(ConfigError::InvalidPort(value as i64).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_apci_parameters_are_valid() {
        ApciParameters::default().validate().unwrap();
    }

    #[test]
    fn w_too_large_is_rejected() {
        let params = ApciParameters {
            w: 9,
            k: 12,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn t2_must_be_less_than_t1() {
        let params = ApciParameters {
            t1: Duration::from_secs(5),
            t2: Duration::from_secs(5),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn debug_flags_union_and_contains() {
        let flags = DebugFlags::SERVER.union(DebugFlags::CLIENT);
        assert!(flags.contains(DebugFlags::SERVER));
        assert!(flags.contains(DebugFlags::CLIENT));
        assert!(!flags.contains(DebugFlags::STATION));
    }

    #[test]
    fn tick_rate_floor_enforced() {
        assert!(validate_tick_rate(Duration::from_millis(49)).is_err());
        assert!(validate_tick_rate(Duration::from_millis(50)).is_ok());
    }
}
