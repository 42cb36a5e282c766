//! Information model: typed value + quality + timestamp records.
//!
//! `Information` is the owned, invariant-checked counterpart to the
//! wire-decoded [`crate::types::MonitoringReport`]. It is what a
//! [`crate::point::DataPoint`] actually stores: every numeric domain named in
//! the information model (normalized range, scaled range, step position,
//! sequence numbers, elapsed/duration fields) is validated once at
//! construction rather than re-checked on every read.

use std::time::SystemTime;

use crate::error::{ApplicationError, EncodeError, Result};
use crate::types::{Cp56Time2a, DataValue, DoublePointValue, Quality, TypeId};

/// Qualifier of command: pulse duration for direct-execute commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualifierOfCommand {
    /// No additional definition
    NoAdditionalDefinition,
    /// Short pulse duration
    ShortPulse,
    /// Long pulse duration
    LongPulse,
    /// Persistent output
    Persistent,
    /// Reserved for specific use, raw qualifier value carried verbatim
    Reserved(u8),
}

impl QualifierOfCommand {
    /// Decode the qualifier from the low 7 bits of a command byte's QU field.
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x7F {
            0 => Self::NoAdditionalDefinition,
            1 => Self::ShortPulse,
            2 => Self::LongPulse,
            3 => Self::Persistent,
            other => Self::Reserved(other),
        }
    }

    /// Encode back to the 7-bit QU field.
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::NoAdditionalDefinition => 0,
            Self::ShortPulse => 1,
            Self::LongPulse => 2,
            Self::Persistent => 3,
            Self::Reserved(v) => *v & 0x7F,
        }
    }
}

/// Step (regulating) command value, per §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCommandValue {
    /// Invalid combination 00
    Invalid0,
    /// Step down
    Lower,
    /// Step up
    Higher,
    /// Invalid combination 11
    Invalid3,
}

impl StepCommandValue {
    /// Decode from the low 2 bits of a C_RC_NA_1 command byte.
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x03 {
            0 => Self::Invalid0,
            1 => Self::Lower,
            2 => Self::Higher,
            _ => Self::Invalid3,
        }
    }

    /// Encode back to the low 2 bits.
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::Invalid0 => 0,
            Self::Lower => 1,
            Self::Higher => 2,
            Self::Invalid3 => 3,
        }
    }
}

/// Command-only extension carried on an `Information` whose `value` is a
/// control-direction variant: the qualifier (pulse length for direct
/// commands) and the select-before-execute `S/E` bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    /// Qualifier of command (pulse duration) — meaningless for set-point
    /// commands, which instead use the low 7 bits as QOS.
    pub qualifier: QualifierOfCommand,
    /// Select-before-execute flag: true = select, false = execute.
    pub select: bool,
}

impl CommandInfo {
    /// A plain execute command with no additional qualifier.
    pub const fn execute() -> Self {
        Self {
            qualifier: QualifierOfCommand::NoAdditionalDefinition,
            select: false,
        }
    }

    /// A select (not execute) command.
    pub const fn select(qualifier: QualifierOfCommand) -> Self {
        Self {
            qualifier,
            select: true,
        }
    }
}

/// A typed value + quality + timestamp record.
///
/// Constructed through [`Information::new_monitoring`] or
/// [`Information::new_command`], both of which enforce the numeric domain of
/// every `DataValue` variant and the timestamp-presence rule from the ASDU
/// codec's encoding policy: non-timestamped TypeIDs must not carry
/// `recorded_at`, timestamped TypeIDs must.
#[derive(Debug, Clone, PartialEq)]
pub struct Information {
    /// The tagged value.
    pub value: DataValue,
    /// Quality flags. Binary-counter values carry their own quality bits
    /// inline in `DataValue::BinaryCounter`; this field is the general set
    /// used by every other variant.
    pub quality: Quality,
    /// Source timestamp. Present iff `type_id.has_time_tag()`.
    pub recorded_at: Option<SystemTime>,
    /// Timestamp of the last local processing operation (construction,
    /// receipt, or send).
    pub processed_at: SystemTime,
    /// Command-only fields (qualifier + select bit). `None` for monitoring
    /// information.
    pub command: Option<CommandInfo>,
    /// When true, setters return `ApplicationError::Readonly` instead of
    /// mutating. Read-only infos are used for wire-decoded snapshots handed
    /// to callbacks as "previous" values.
    pub readonly: bool,
}

impl Information {
    /// Construct a monitoring-direction Information, enforcing the
    /// timestamp-presence rule and the value's numeric domain.
    pub fn new_monitoring(
        type_id: TypeId,
        value: DataValue,
        quality: Quality,
        recorded_at: Option<SystemTime>,
        now: SystemTime,
    ) -> Result<Self> {
        validate_value_domain(&value)?;
        let recorded_at = reconcile_timestamp(type_id, recorded_at, now)?;
        Ok(Self {
            value,
            quality,
            recorded_at,
            processed_at: now,
            command: None,
            readonly: false,
        })
    }

    /// Construct a control-direction Information (a command).
    pub fn new_command(
        type_id: TypeId,
        value: DataValue,
        command: CommandInfo,
        recorded_at: Option<SystemTime>,
        now: SystemTime,
    ) -> Result<Self> {
        validate_value_domain(&value)?;
        let recorded_at = reconcile_timestamp(type_id, recorded_at, now)?;
        Ok(Self {
            value,
            quality: Quality::Good,
            recorded_at,
            processed_at: now,
            command: Some(command),
            readonly: false,
        })
    }

    /// Mark this Information read-only (used for snapshots handed to
    /// callbacks).
    #[must_use]
    pub fn into_readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Replace `value`/`quality`, refreshing `processed_at`. Fails if
    /// `readonly`.
    pub fn set_value_and_quality(
        &mut self,
        value: DataValue,
        quality: Quality,
        now: SystemTime,
    ) -> Result<()> {
        if self.readonly {
            return Err(ApplicationError::Readonly.into());
        }
        validate_value_domain(&value)?;
        self.value = value;
        self.quality = quality;
        self.processed_at = now;
        Ok(())
    }

    /// Refresh `recorded_at`, e.g. when a station auto-stamps on write.
    /// Fails if `readonly`.
    pub fn set_recorded_at(&mut self, recorded_at: Option<SystemTime>) -> Result<()> {
        if self.readonly {
            return Err(ApplicationError::Readonly.into());
        }
        self.recorded_at = recorded_at;
        Ok(())
    }

    /// True if this is a command Information (`type_id` was control-direction
    /// at construction).
    pub const fn is_command(&self) -> bool {
        self.command.is_some()
    }
}

/// Validate the numeric domain of a `DataValue` per §4.3.
pub(crate) fn validate_value_domain(value: &DataValue) -> Result<()> {
    match value {
        DataValue::Normalized(v) => {
            if !(-1.0..=(1.0 - 1.0 / 32768.0)).contains(v) {
                return Err(EncodeError::OutOfRange {
                    field: "normalized",
                    value: (*v * 32768.0) as i64,
                }
                .into());
            }
        }
        DataValue::Scaled(_) => {} // i16 is already the full legal range
        DataValue::StepPosition(v) => {
            if !(-64..=63).contains(v) {
                return Err(EncodeError::OutOfRange {
                    field: "step_position",
                    value: *v as i64,
                }
                .into());
            }
        }
        DataValue::BinaryCounter { sequence, .. } => {
            if *sequence > 31 {
                return Err(EncodeError::OutOfRange {
                    field: "bcr_sequence",
                    value: *sequence as i64,
                }
                .into());
            }
        }
        DataValue::ProtectionEvent { .. } => {} // elapsed_ms is u16, already bounded
        DataValue::ProtectionStartEvents { field, .. } => {
            if *field > 0x3F {
                return Err(EncodeError::OutOfRange {
                    field: "protection_start_events_field",
                    value: *field as i64,
                }
                .into());
            }
        }
        DataValue::ProtectionOutputCircuits { field, .. } => {
            if *field > 0x0F {
                return Err(EncodeError::OutOfRange {
                    field: "protection_output_circuits_field",
                    value: *field as i64,
                }
                .into());
            }
        }
        DataValue::Double(v) => {
            // All four DoublePointValue variants are legal; nothing to check,
            // kept as an explicit arm so new variants aren't silently skipped.
            let _ = v;
        }
        DataValue::Single(_)
        | DataValue::Float(_)
        | DataValue::Counter(_)
        | DataValue::Bitstring(_)
        | DataValue::StatusWithChange { .. } => {}
    }
    Ok(())
}

/// Enforce the timestamp-presence rule: non-timestamped TypeIDs must not
/// carry `recorded_at`; timestamped TypeIDs must, auto-injecting `now` if the
/// caller omitted it.
pub(crate) fn reconcile_timestamp(
    type_id: TypeId,
    recorded_at: Option<SystemTime>,
    now: SystemTime,
) -> Result<Option<SystemTime>> {
    if type_id.has_time_tag() {
        Ok(Some(recorded_at.unwrap_or(now)))
    } else if recorded_at.is_some() {
        Err(EncodeError::UnexpectedTimestamp(type_id.standard_name()).into())
    } else {
        Ok(None)
    }
}

/// Convert a `SystemTime` + station timezone policy into a `Cp56Time2a`.
///
/// `tz_offset_secs` is the station's configured offset from UTC; `dst` shifts
/// the effective offset by +3600s and sets the SU bit, per §4.5.
pub fn system_time_to_cp56(
    time: SystemTime,
    tz_offset_secs: i32,
    dst: bool,
    invalid: bool,
) -> Cp56Time2a {
    let effective_offset = tz_offset_secs + if dst { 3600 } else { 0 };
    let unix_ms = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
        + effective_offset as i64 * 1000;
    let (year, month, day, day_of_week, hours, minutes, milliseconds) = civil_from_unix_ms(unix_ms);
    Cp56Time2a {
        milliseconds,
        minutes,
        hours,
        day,
        day_of_week,
        month,
        year,
        invalid,
        summer_time: dst,
    }
}

/// Convert a `Cp56Time2a` back to `SystemTime`, undoing the station's
/// timezone/DST policy.
pub fn cp56_to_system_time(time: &Cp56Time2a, tz_offset_secs: i32, dst: bool) -> SystemTime {
    let effective_offset = tz_offset_secs + if dst { 3600 } else { 0 };
    let days = days_from_civil(2000 + time.year as i64, time.month as i64, time.day as i64);
    let secs_of_day =
        time.hours as i64 * 3600 + time.minutes as i64 * 60 + (time.milliseconds / 1000) as i64;
    let ms_of_sec = (time.milliseconds % 1000) as i64;
    let unix_secs = days * 86400 + secs_of_day - effective_offset as i64;
    let unix_ms = unix_secs * 1000 + ms_of_sec;
    if unix_ms >= 0 {
        SystemTime::UNIX_EPOCH + std::time::Duration::from_millis(unix_ms as u64)
    } else {
        SystemTime::UNIX_EPOCH - std::time::Duration::from_millis((-unix_ms) as u64)
    }
}

/// Days since the Unix epoch for a given proleptic-Gregorian civil date.
/// Howard Hinnant's `days_from_civil` algorithm.
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

/// Inverse of `days_from_civil`, the `civil_from_days` algorithm, extended to
/// split out time-of-day fields from a millisecond Unix timestamp.
fn civil_from_unix_ms(unix_ms: i64) -> (u8, u8, u8, u8, u8, u8, u16) {
    let days = unix_ms.div_euclid(86_400_000);
    let ms_of_day = unix_ms.rem_euclid(86_400_000);

    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as i64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let y = if m <= 2 { y + 1 } else { y };

    // 1970-01-01 was a Thursday; IEC104 day_of_week is 1=Monday..7=Sunday.
    let day_of_week = (((days.rem_euclid(7)) + 3) % 7 + 1) as u8;

    let hours = (ms_of_day / 3_600_000) as u8;
    let minutes = ((ms_of_day / 60_000) % 60) as u8;
    let milliseconds = (ms_of_day % 60_000) as u16;

    (
        (y - 2000).clamp(0, 99) as u8,
        m,
        d,
        day_of_week,
        hours,
        minutes,
        milliseconds,
    )
}

/// Returns the matching `DataValue` variant discriminant name for a TypeID,
/// used to validate `(type ↔ info variant)` compatibility in
/// `DataPoint::set_info`.
pub fn expected_variant_name(type_id: TypeId) -> &'static str {
    use TypeId::*;
    match type_id {
        SinglePoint | SinglePointTime24 | SinglePointTime56 | SingleCommand
        | SingleCommandTime56 => "Single",
        DoublePoint | DoublePointTime24 | DoublePointTime56 | DoubleCommand
        | DoubleCommandTime56 => "Double",
        StepPosition | StepPositionTime56 | RegulatingStep => "StepPosition",
        Bitstring32 | Bitstring32Time56 | Bitstring32Command => "Bitstring",
        MeasuredNormalized | MeasuredNormalizedTime24 | SetpointNormalized => "Normalized",
        MeasuredScaled | MeasuredScaledTime24 | SetpointScaled => "Scaled",
        MeasuredFloat | MeasuredFloatTime24 | MeasuredFloatTime56 | SetpointFloat
        | SetpointFloatTime56 => "Float",
        IntegratedTotals => "BinaryCounter",
        PackedSingleWithChange => "StatusWithChange",
        ProtectionEventTime24 | ProtectionEventTime56 => "ProtectionEvent",
        ProtectionStartEventsTime24 | ProtectionStartEventsTime56 => "ProtectionStartEvents",
        ProtectionOutputCircuitsTime24 | ProtectionOutputCircuitsTime56 => {
            "ProtectionOutputCircuits"
        }
        EndOfInit => "Single",
        InterrogationCommand | CounterInterrogation | ReadCommand | ClockSync | TestCommand
        | ResetProcess | TestCommandTime56 => "Counter",
    }
}

/// Returns true if `value`'s variant matches the TypeID's expected variant.
pub fn value_matches_type(type_id: TypeId, value: &DataValue) -> bool {
    let actual = match value {
        DataValue::Single(_) => "Single",
        DataValue::Double(_) => "Double",
        DataValue::Normalized(_) => "Normalized",
        DataValue::Scaled(_) => "Scaled",
        DataValue::Float(_) => "Float",
        DataValue::Counter(_) => "Counter",
        DataValue::Bitstring(_) => "Bitstring",
        DataValue::StepPosition(_) => "StepPosition",
        DataValue::BinaryCounter { .. } => "BinaryCounter",
        DataValue::ProtectionEvent { .. } => "ProtectionEvent",
        DataValue::ProtectionStartEvents { .. } => "ProtectionStartEvents",
        DataValue::ProtectionOutputCircuits { .. } => "ProtectionOutputCircuits",
        DataValue::StatusWithChange { .. } => "StatusWithChange",
    };
    actual == expected_variant_name(type_id)
}

/// Construct a "zero value" matching a TypeID's expected `DataValue` variant,
/// used when a new point is added without an explicit initial value.
pub fn default_value_for(type_id: TypeId) -> DataValue {
    match expected_variant_name(type_id) {
        "Single" => DataValue::Single(false),
        "Double" => DataValue::Double(DoublePointValue::Indeterminate),
        "StepPosition" => DataValue::StepPosition(0),
        "Bitstring" => DataValue::Bitstring(0),
        "Normalized" => DataValue::Normalized(0.0),
        "Scaled" => DataValue::Scaled(0),
        "Float" => DataValue::Float(0.0),
        "BinaryCounter" => DataValue::BinaryCounter {
            value: 0,
            sequence: 0,
            carry: false,
            adjusted: false,
            invalid: false,
        },
        "ProtectionEvent" => DataValue::ProtectionEvent {
            state: DoublePointValue::Indeterminate,
            elapsed_ms: 0,
        },
        "ProtectionStartEvents" => DataValue::ProtectionStartEvents {
            field: 0,
            relay_duration_ms: 0,
        },
        "ProtectionOutputCircuits" => DataValue::ProtectionOutputCircuits {
            field: 0,
            relay_operating_ms: 0,
        },
        "StatusWithChange" => DataValue::StatusWithChange {
            current: 0,
            changed: 0,
        },
        _ => DataValue::Single(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_rejects_out_of_range() {
        let err = Information::new_monitoring(
            TypeId::MeasuredNormalized,
            DataValue::Normalized(1.5),
            Quality::Good,
            None,
            SystemTime::now(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn non_timestamped_type_rejects_recorded_at() {
        let err = Information::new_monitoring(
            TypeId::SinglePoint,
            DataValue::Single(true),
            Quality::Good,
            Some(SystemTime::now()),
            SystemTime::now(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn timestamped_type_auto_injects_recorded_at() {
        let info = Information::new_monitoring(
            TypeId::SinglePointTime56,
            DataValue::Single(true),
            Quality::Good,
            None,
            SystemTime::now(),
        )
        .unwrap();
        assert!(info.recorded_at.is_some());
    }

    #[test]
    fn readonly_rejects_mutation() {
        let mut info = Information::new_monitoring(
            TypeId::SinglePoint,
            DataValue::Single(true),
            Quality::Good,
            None,
            SystemTime::now(),
        )
        .unwrap()
        .into_readonly();
        let result = info.set_value_and_quality(DataValue::Single(false), Quality::Good, SystemTime::now());
        assert!(result.is_err());
    }

    #[test]
    fn cp56_roundtrip_within_one_ms() {
        let now = SystemTime::now();
        let cp56 = system_time_to_cp56(now, 7200, true, false);
        let back = cp56_to_system_time(&cp56, 7200, true);
        let diff = now
            .duration_since(back)
            .or_else(|_| back.duration_since(now))
            .unwrap();
        assert!(diff.as_millis() < 1000);
    }

    #[test]
    fn step_position_rejects_out_of_range() {
        let err = Information::new_monitoring(
            TypeId::StepPosition,
            DataValue::StepPosition(100),
            Quality::Good,
            None,
            SystemTime::now(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn value_matches_type_checks_variant() {
        assert!(value_matches_type(TypeId::SinglePoint, &DataValue::Single(true)));
        assert!(!value_matches_type(TypeId::SinglePoint, &DataValue::Float(1.0)));
    }
}
