//! Encodes a `(Ioa, TypeId, Information)` triple into a wire
//! [`InformationObject`] — the mirror image of `parser.rs`'s decode path.
//!
//! Grounded on `parser.rs`'s per-TypeID layouts (SIQ/DIQ + optional
//! CP56Time2a) and `asdu.rs`'s existing `QualityDescriptor`/`MeasuredQuality`/
//! `Cp56Time2a` encoders. Covers the monitoring and command TypeIDs
//! `DataPoint`/`Server`/`ClientEngine` actually construct; a TypeID with no
//! arm here returns `EncodeError::OutOfRange` rather than panicking.

use bytes::{BufMut, BytesMut};

use crate::error::{EncodeError, Result};
use crate::information::{reconcile_timestamp, CommandInfo, Information};
use crate::types::{DataValue, InformationObject, Ioa, MeasuredQuality, QualityDescriptor, Quality, TypeId};

fn quality_to_descriptor(q: Quality) -> QualityDescriptor {
    QualityDescriptor {
        blocked: q.blocked,
        substituted: q.substituted,
        not_topical: q.not_topical,
        invalid: q.invalid,
    }
}

fn quality_to_measured(q: Quality) -> MeasuredQuality {
    MeasuredQuality {
        overflow: q.overflow,
        blocked: q.blocked,
        substituted: q.substituted,
        not_topical: q.not_topical,
        invalid: q.invalid,
    }
}

fn push_timestamp(buf: &mut BytesMut, type_id: TypeId, recorded_at: Option<std::time::SystemTime>) {
    if !type_id.has_time_tag() {
        return;
    }
    let time = recorded_at.unwrap_or_else(std::time::SystemTime::now);
    let cp56 = crate::information::system_time_to_cp56(time, 0, false, false);
    buf.put_slice(&cp56.to_bytes());
}

/// Encode a monitoring-direction `Information` into a wire information
/// object for `type_id` at `ioa`.
pub fn encode_information_object(
    ioa: Ioa,
    type_id: TypeId,
    info: &Information,
) -> Result<InformationObject> {
    reconcile_timestamp(type_id, info.recorded_at, info.processed_at)?;
    let mut buf = BytesMut::new();

    // CP24Time2a (the 3-byte short timestamp on the *Time24 TypeIDs) is not
    // modeled anywhere in this crate yet — `parser.rs` skips those bytes
    // rather than decoding them. Encoding the Time24 family is left to
    // follow once that type exists; only non-timestamped and CP56 (Time56)
    // variants are produced here.
    match (type_id, &info.value) {
        (TypeId::SinglePoint | TypeId::SinglePointTime56, DataValue::Single(v)) => {
            let mut siq = quality_to_descriptor(info.quality).to_siq();
            if *v {
                siq |= 0x01;
            }
            buf.put_u8(siq);
            push_timestamp(&mut buf, type_id, info.recorded_at);
        }
        (TypeId::DoublePoint | TypeId::DoublePointTime56, DataValue::Double(v)) => {
            let diq = quality_to_descriptor(info.quality).to_siq() | v.as_u8();
            buf.put_u8(diq);
            push_timestamp(&mut buf, type_id, info.recorded_at);
        }
        (TypeId::MeasuredNormalized, DataValue::Normalized(v)) => {
            if !(-1.0..=1.0).contains(v) {
                return Err(EncodeError::OutOfRange {
                    field: "normalized",
                    value: (*v * 32768.0) as i64,
                }
                .into());
            }
            let raw = (*v * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            buf.put_i16_le(raw);
            buf.put_u8(quality_to_measured(info.quality).as_u8());
        }
        (TypeId::MeasuredScaled, DataValue::Scaled(v)) => {
            buf.put_i16_le(*v);
            buf.put_u8(quality_to_measured(info.quality).as_u8());
        }
        (TypeId::MeasuredFloat | TypeId::MeasuredFloatTime56, DataValue::Float(v)) => {
            buf.put_f32_le(*v);
            buf.put_u8(quality_to_measured(info.quality).as_u8());
            push_timestamp(&mut buf, type_id, info.recorded_at);
        }
        (
            TypeId::IntegratedTotals,
            DataValue::BinaryCounter {
                value,
                sequence,
                carry,
                adjusted,
                invalid,
            },
        ) => {
            buf.put_i32_le(*value);
            let mut flags = sequence & 0x1F;
            if *carry {
                flags |= 0x20;
            }
            if *adjusted {
                flags |= 0x40;
            }
            if *invalid {
                flags |= 0x80;
            }
            buf.put_u8(flags);
        }
        _ => {
            return Err(EncodeError::OutOfRange {
                field: "type_id",
                value: type_id.as_u8() as i64,
            }
            .into())
        }
    }

    Ok(InformationObject::new(ioa, buf.freeze()))
}

/// Encode a control-direction `Information` (a command) into a wire
/// information object, per the SCO/DCO qualifier layout.
pub fn encode_command_object(
    ioa: Ioa,
    type_id: TypeId,
    value: &DataValue,
    command: &CommandInfo,
) -> Result<InformationObject> {
    let mut buf = BytesMut::new();
    let select_bit = if command.select { 0x80 } else { 0 };
    let qu = (command.qualifier.as_u8() & 0x1F) << 2;

    match (type_id, value) {
        (TypeId::SingleCommand | TypeId::SingleCommandTime56, DataValue::Single(v)) => {
            let sco = select_bit | qu | if *v { 0x01 } else { 0x00 };
            buf.put_u8(sco);
            if type_id.has_time_tag() {
                push_timestamp(&mut buf, type_id, None);
            }
        }
        (TypeId::DoubleCommand | TypeId::DoubleCommandTime56, DataValue::Double(v)) => {
            let dco = select_bit | qu | v.as_u8();
            buf.put_u8(dco);
            if type_id.has_time_tag() {
                push_timestamp(&mut buf, type_id, None);
            }
        }
        (TypeId::SetpointFloat, DataValue::Float(v)) => {
            buf.put_f32_le(*v);
            buf.put_u8(select_bit | (command.qualifier.as_u8() & 0x7F));
        }
        _ => {
            return Err(EncodeError::OutOfRange {
                field: "command_type_id",
                value: type_id.as_u8() as i64,
            }
            .into())
        }
    }

    Ok(InformationObject::new(ioa, buf.freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::information::QualifierOfCommand;
    use std::time::SystemTime;

    #[test]
    fn encodes_single_point() {
        let info = Information::new_monitoring(
            TypeId::SinglePoint,
            DataValue::Single(true),
            Quality::Good,
            None,
            SystemTime::now(),
        )
        .unwrap();
        let obj = encode_information_object(Ioa::new(1), TypeId::SinglePoint, &info).unwrap();
        assert_eq!(obj.data[0] & 0x01, 0x01);
    }

    #[test]
    fn encodes_measured_float() {
        let info = Information::new_monitoring(
            TypeId::MeasuredFloat,
            DataValue::Float(3.5),
            Quality::Good,
            None,
            SystemTime::now(),
        )
        .unwrap();
        let obj = encode_information_object(Ioa::new(1), TypeId::MeasuredFloat, &info).unwrap();
        let raw = f32::from_le_bytes([obj.data[0], obj.data[1], obj.data[2], obj.data[3]]);
        assert_eq!(raw, 3.5);
    }

    #[test]
    fn encodes_single_command_with_select_bit() {
        let obj = encode_command_object(
            Ioa::new(5),
            TypeId::SingleCommand,
            &DataValue::Single(true),
            &CommandInfo::select(QualifierOfCommand::ShortPulse),
        )
        .unwrap();
        assert_eq!(obj.data[0] & 0x80, 0x80);
        assert_eq!(obj.data[0] & 0x01, 0x01);
    }

    #[test]
    fn unsupported_combination_is_rejected() {
        let info = Information::new_monitoring(
            TypeId::SinglePoint,
            DataValue::Single(true),
            Quality::Good,
            None,
            SystemTime::now(),
        )
        .unwrap();
        assert!(encode_information_object(Ioa::new(1), TypeId::Bitstring32, &info).is_err());
    }
}
