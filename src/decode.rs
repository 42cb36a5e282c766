//! Decodes the control-direction (command) and system-command information
//! objects `parser.rs` leaves as opaque bytes — the mirror image of
//! `encode.rs`'s command-encoding path. `parser.rs` only decodes the
//! monitoring direction; `ServerEngine`/`ClientEngine` need the command
//! direction too, for dispatching received C_* ASDUs.

use crate::error::{DecodeError, Result};
use crate::information::{CommandInfo, QualifierOfCommand};
use crate::types::{Cp56Time2a, DataValue, DoublePointValue, TypeId};

/// Decode a command-direction information object's body (the bytes after
/// the 3-byte IOA) for `type_id` into its value plus qualifier/select bit.
pub fn decode_command_object(type_id: TypeId, data: &[u8]) -> Result<(DataValue, CommandInfo)> {
    match type_id {
        TypeId::SingleCommand | TypeId::SingleCommandTime56 => {
            let sco = *data
                .first()
                .ok_or(DecodeError::Truncated { expected: 1, actual: 0 })?;
            let value = DataValue::Single(sco & 0x01 != 0);
            let command = CommandInfo {
                qualifier: QualifierOfCommand::from_u8((sco >> 2) & 0x1F),
                select: sco & 0x80 != 0,
            };
            Ok((value, command))
        }
        TypeId::DoubleCommand | TypeId::DoubleCommandTime56 => {
            let dco = *data
                .first()
                .ok_or(DecodeError::Truncated { expected: 1, actual: 0 })?;
            let value = DataValue::Double(DoublePointValue::from_u8(dco));
            let command = CommandInfo {
                qualifier: QualifierOfCommand::from_u8((dco >> 2) & 0x1F),
                select: dco & 0x80 != 0,
            };
            Ok((value, command))
        }
        TypeId::SetpointFloat | TypeId::SetpointFloatTime56 => {
            if data.len() < 5 {
                return Err(DecodeError::Truncated {
                    expected: 5,
                    actual: data.len(),
                }
                .into());
            }
            let raw = f32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            let qos = data[4];
            let command = CommandInfo {
                qualifier: QualifierOfCommand::from_u8(qos & 0x7F),
                select: qos & 0x80 != 0,
            };
            Ok((DataValue::Float(raw), command))
        }
        TypeId::SetpointScaled => {
            if data.len() < 3 {
                return Err(DecodeError::Truncated {
                    expected: 3,
                    actual: data.len(),
                }
                .into());
            }
            let raw = i16::from_le_bytes([data[0], data[1]]);
            let qos = data[2];
            let command = CommandInfo {
                qualifier: QualifierOfCommand::from_u8(qos & 0x7F),
                select: qos & 0x80 != 0,
            };
            Ok((DataValue::Scaled(raw), command))
        }
        TypeId::SetpointNormalized => {
            if data.len() < 3 {
                return Err(DecodeError::Truncated {
                    expected: 3,
                    actual: data.len(),
                }
                .into());
            }
            let raw = i16::from_le_bytes([data[0], data[1]]) as f32 / 32768.0;
            let qos = data[2];
            let command = CommandInfo {
                qualifier: QualifierOfCommand::from_u8(qos & 0x7F),
                select: qos & 0x80 != 0,
            };
            Ok((DataValue::Normalized(raw), command))
        }
        other => Err(DecodeError::TypeMismatch {
            expected: "command type id",
            received: other.standard_name(),
        }
        .into()),
    }
}

/// Decode the qualifier-of-interrogation byte of a C_IC_NA_1 ASDU
/// (station/group interrogation request).
pub fn decode_qoi(data: &[u8]) -> Result<u8> {
    data.first()
        .copied()
        .ok_or_else(|| DecodeError::Truncated { expected: 1, actual: 0 }.into())
}

/// Decode the qualifier-of-counter-interrogation byte of a C_CI_NA_1 ASDU:
/// returns `(request_group, freeze_or_reset)` where `request_group` is 0
/// (general) or 1..=4, per QCC bits 0-5/6-7.
pub fn decode_qcc(data: &[u8]) -> Result<(u8, u8)> {
    let qcc = *data
        .first()
        .ok_or(DecodeError::Truncated { expected: 1, actual: 0 })?;
    Ok((qcc & 0x3F, (qcc >> 6) & 0x03))
}

/// Decode a C_CS_NA_1 clock-synchronization command's CP56Time2a payload.
pub fn decode_clock_sync(data: &[u8]) -> Result<Cp56Time2a> {
    Cp56Time2a::from_bytes(data)
}

/// Decode a C_TS_NA_1 test command's 2-byte test sequence number.
pub fn decode_test_sequence(data: &[u8]) -> Result<u16> {
    if data.len() < 2 {
        return Err(DecodeError::Truncated {
            expected: 2,
            actual: data.len(),
        }
        .into());
    }
    Ok(u16::from_le_bytes([data[0], data[1]]))
}

/// Decode a C_RP_NA_1 reset-process command's qualifier byte.
pub fn decode_qrp(data: &[u8]) -> Result<u8> {
    data.first()
        .copied()
        .ok_or_else(|| DecodeError::Truncated { expected: 1, actual: 0 }.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_command_with_select() {
        let (value, cmd) = decode_command_object(TypeId::SingleCommand, &[0x81]).unwrap();
        assert_eq!(value, DataValue::Single(true));
        assert!(cmd.select);
    }

    #[test]
    fn decodes_double_command() {
        let (value, cmd) = decode_command_object(TypeId::DoubleCommand, &[0x02]).unwrap();
        assert_eq!(value, DataValue::Double(DoublePointValue::On));
        assert!(!cmd.select);
    }

    #[test]
    fn decodes_setpoint_float() {
        let mut bytes = 3.5f32.to_le_bytes().to_vec();
        bytes.push(0x00);
        let (value, _) = decode_command_object(TypeId::SetpointFloat, &bytes).unwrap();
        assert_eq!(value, DataValue::Float(3.5));
    }

    #[test]
    fn decodes_qoi_and_qcc() {
        assert_eq!(decode_qoi(&[20]).unwrap(), 20);
        assert_eq!(decode_qcc(&[0x45]).unwrap(), (0x05, 0x01));
    }

    #[test]
    fn rejects_truncated_command() {
        assert!(decode_command_object(TypeId::SetpointFloat, &[0, 0]).is_err());
    }
}
