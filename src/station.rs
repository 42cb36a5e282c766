//! Station: a container of [`crate::point::DataPoint`]s under one common
//! address, plus the timezone/DST policy used to auto-stamp timestamped
//! Information. Grounded on `Station.h`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::SystemTime;

use crate::error::{ApplicationError, ConfigError, Result};
use crate::information::system_time_to_cp56;
use crate::point::{DataPoint, PointBuilder};
use crate::types::{Asdu, AsduHeader, Cot, Ioa, TypeId};

/// Common address, 1..=65534; 0 is invalid, 65535 is the broadcast wildcard
/// and is never used as a stored station.
pub const BROADCAST_CA: u16 = 65535;

/// Whether a Station lives under a local `Server` or a remote-side `Client`
/// connection — gates which DataPoint operations/callbacks are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Station is local to a Server (controlled station / outstation).
    Server,
    /// Station represents a remote station reachable through a Client
    /// connection (controlling station's view of an RTU).
    Client,
}

/// Cause of initialization, carried by M_EI_NA_1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CauseOfInitialization {
    /// Local power switch on.
    LocalPowerOn,
    /// Local manual reset.
    LocalManualReset,
    /// Remote reset.
    RemoteReset,
    /// Raw/unrecognized COI value, carried verbatim.
    Other(u8),
}

impl CauseOfInitialization {
    /// Encode to the COI wire byte (bit 7 is reserved/unused here).
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::LocalPowerOn => 0,
            Self::LocalManualReset => 1,
            Self::RemoteReset => 2,
            Self::Other(v) => v,
        }
    }
}

/// A station: one common address, its owned points, and the clock policy
/// used to stamp timestamped Information auto-generated on this side.
pub struct Station {
    common_address: u16,
    role: Role,
    points: RwLock<HashMap<u32, Arc<DataPoint>>>,
    /// Offset from UTC, in seconds, not including DST.
    tz_offset_secs: std::sync::atomic::AtomicI32,
    dst: AtomicBool,
    /// When true, auto-injected timestamps are tagged
    /// `Quality::substituted`.
    auto_time_substituted: AtomicBool,
    self_ref: RwLock<Weak<Station>>,
}

impl Station {
    /// Create a new station. `common_address` must be in 1..=65534.
    pub fn new(common_address: u16, role: Role) -> Result<Arc<Self>> {
        if common_address == 0 || common_address == BROADCAST_CA {
            return Err(ConfigError::InvalidAddress(
                format!("common address {common_address} is reserved").into(),
            )
            .into());
        }
        let station = Arc::new(Self {
            common_address,
            role,
            points: RwLock::new(HashMap::new()),
            tz_offset_secs: std::sync::atomic::AtomicI32::new(0),
            dst: AtomicBool::new(false),
            auto_time_substituted: AtomicBool::new(false),
            self_ref: RwLock::new(Weak::new()),
        });
        *station.self_ref.write().unwrap() = Arc::downgrade(&station);
        Ok(station)
    }

    /// Common address.
    pub const fn common_address(&self) -> u16 {
        self.common_address
    }

    /// Server or Client role.
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Configure the station's timezone offset from UTC, in seconds.
    pub fn set_tz_offset_secs(&self, offset: i32) {
        self.tz_offset_secs.store(offset, Ordering::Relaxed);
    }

    /// Current timezone offset from UTC, in seconds (excludes DST).
    pub fn tz_offset_secs(&self) -> i32 {
        self.tz_offset_secs.load(Ordering::Relaxed)
    }

    /// Toggle daylight-saving time; effective offset shifts by ±3600s.
    pub fn set_dst(&self, dst: bool) {
        self.dst.store(dst, Ordering::Relaxed);
    }

    /// Whether DST is currently in effect.
    pub fn dst(&self) -> bool {
        self.dst.load(Ordering::Relaxed)
    }

    /// Enable/disable tagging auto-injected timestamps as
    /// `Quality::substituted`.
    pub fn set_auto_time_substituted(&self, value: bool) {
        self.auto_time_substituted.store(value, Ordering::Relaxed);
    }

    /// Whether auto-injected timestamps are tagged substituted.
    pub fn auto_time_substituted(&self) -> bool {
        self.auto_time_substituted.load(Ordering::Relaxed)
    }

    /// Convert a `SystemTime` to wire `Cp56Time2a` using this station's
    /// timezone/DST policy.
    pub fn to_cp56(&self, time: SystemTime, invalid: bool) -> crate::types::Cp56Time2a {
        system_time_to_cp56(time, self.tz_offset_secs(), self.dst(), invalid)
    }

    /// Add a point to this station. `builder` supplies every DataPoint
    /// field except the owning station, which is set here.
    pub fn add_point(self: &Arc<Self>, builder: PointBuilder) -> Result<Arc<DataPoint>> {
        let point = builder.build(Arc::downgrade(self), self.role)?;
        let ioa = point.ioa().value();
        self.points.write().unwrap().insert(ioa, point.clone());
        Ok(point)
    }

    /// Look up a point by IOA.
    pub fn get_point(&self, ioa: Ioa) -> Option<Arc<DataPoint>> {
        self.points.read().unwrap().get(&ioa.value()).cloned()
    }

    /// Remove a point by IOA, detaching its back-reference. Returns true if
    /// a point was removed.
    pub fn remove_point(&self, ioa: Ioa) -> bool {
        let removed = self.points.write().unwrap().remove(&ioa.value());
        if let Some(point) = removed {
            point.detach();
            true
        } else {
            false
        }
    }

    /// All points, in ascending IOA order (the order §4.8 requires for
    /// interrogation batching).
    pub fn points_sorted(&self) -> Vec<Arc<DataPoint>> {
        let guard = self.points.read().unwrap();
        let mut points: Vec<_> = guard.values().cloned().collect();
        points.sort_by_key(|p| p.ioa().value());
        points
    }

    /// Number of owned points.
    pub fn point_count(&self) -> usize {
        self.points.read().unwrap().len()
    }

    /// Build an M_EI_NA_1 "end of initialization" ASDU. Server-role only.
    pub fn end_of_initialization_asdu(&self, coi: CauseOfInitialization) -> Result<Asdu> {
        if self.role != Role::Server {
            return Err(ApplicationError::WrongRole.into());
        }
        let mut asdu = Asdu::new(AsduHeader::new(
            TypeId::EndOfInit,
            1,
            Cot::Initialized,
            self.common_address,
        ));
        asdu.objects.push(crate::types::InformationObject::new(
            Ioa::new(0),
            bytes::Bytes::copy_from_slice(&[coi.as_u8()]),
        ));
        Ok(asdu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::PointBuilder;

    #[test]
    fn rejects_invalid_common_address() {
        assert!(Station::new(0, Role::Server).is_err());
        assert!(Station::new(BROADCAST_CA, Role::Server).is_err());
    }

    #[test]
    fn add_get_remove_point_roundtrip() {
        let station = Station::new(1, Role::Server).unwrap();
        let point = station
            .add_point(PointBuilder::new(Ioa::new(100), TypeId::SinglePoint))
            .unwrap();
        assert_eq!(point.ioa().value(), 100);
        assert!(station.get_point(Ioa::new(100)).is_some());
        assert_eq!(station.point_count(), 1);
        assert!(station.remove_point(Ioa::new(100)));
        assert!(station.get_point(Ioa::new(100)).is_none());
    }

    #[test]
    fn points_sorted_ascending() {
        let station = Station::new(1, Role::Server).unwrap();
        station
            .add_point(PointBuilder::new(Ioa::new(300), TypeId::SinglePoint))
            .unwrap();
        station
            .add_point(PointBuilder::new(Ioa::new(100), TypeId::SinglePoint))
            .unwrap();
        station
            .add_point(PointBuilder::new(Ioa::new(200), TypeId::SinglePoint))
            .unwrap();
        let ioas: Vec<_> = station.points_sorted().iter().map(|p| p.ioa().value()).collect();
        assert_eq!(ioas, vec![100, 200, 300]);
    }

    #[test]
    fn end_of_initialization_rejected_on_client_role() {
        let station = Station::new(1, Role::Client).unwrap();
        assert!(station
            .end_of_initialization_asdu(CauseOfInitialization::LocalPowerOn)
            .is_err());
    }

    #[test]
    fn end_of_initialization_ok_on_server_role() {
        let station = Station::new(1, Role::Server).unwrap();
        let asdu = station
            .end_of_initialization_asdu(CauseOfInitialization::RemoteReset)
            .unwrap();
        assert_eq!(asdu.header.type_id, TypeId::EndOfInit);
        assert_eq!(asdu.objects[0].data[0], 2);
    }
}
