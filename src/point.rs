//! DataPoint: one information-object address within a [`crate::station::Station`],
//! its current `Information`, its auto-transmit/auto-return/select policy,
//! and its four user callback slots. Grounded on `DataPoint.h`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, RwLock, Weak};
use std::time::{Duration, Instant, SystemTime};

use crate::callback::{invoke_guarded, Callback, ResponseState};
use crate::config::CommandMode;
use crate::error::{ApplicationError, ConfigError, Result};
use crate::information::{validate_value_domain, value_matches_type, CommandInfo, Information};
use crate::station::{Role, Station};
use crate::types::{DataValue, Ioa, Quality, TypeId};

/// Sentinel meaning "no related information object address is set",
/// mirroring the C++ `MAX_INFORMATION_OBJECT_ADDRESS` guard value.
pub const NO_RELATED_IOA: u32 = 0x00FF_FFFF;

/// A message delivered to `on_receive`: the freshly applied value plus who
////what is responsible for it.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Value and quality as just applied to the point.
    pub information: Information,
    /// True if this update originated from the network (vs. a local
    /// `set_value` call).
    pub from_network: bool,
}

/// Builds a [`DataPoint`] before it is attached to a station; `Station::add_point`
/// consumes this and supplies the owning station/role.
pub struct PointBuilder {
    ioa: Ioa,
    type_id: TypeId,
    initial_value: Option<DataValue>,
    command_mode: CommandMode,
    related_ioa: u32,
    related_auto_return: bool,
    report_interval: Option<Duration>,
    timer_interval: Option<Duration>,
    readonly: bool,
    groups: std::collections::HashSet<u8>,
}

impl PointBuilder {
    /// Start building a point for `ioa`/`type_id`, with type-appropriate
    /// default value, no related IOA, and direct command mode.
    pub fn new(ioa: Ioa, type_id: TypeId) -> Self {
        Self {
            ioa,
            type_id,
            initial_value: None,
            command_mode: CommandMode::default(),
            related_ioa: NO_RELATED_IOA,
            related_auto_return: false,
            report_interval: None,
            timer_interval: None,
            readonly: false,
            groups: std::collections::HashSet::new(),
        }
    }

    /// Override the initial value (default otherwise comes from
    /// `default_value_for(type_id)`).
    pub fn with_initial_value(mut self, value: DataValue) -> Self {
        self.initial_value = Some(value);
        self
    }

    /// Require select-before-execute for this command point.
    pub fn with_command_mode(mut self, mode: CommandMode) -> Self {
        self.command_mode = mode;
        self
    }

    /// Link this command point to the monitoring point that should auto-return
    /// after the command executes.
    pub fn with_related_ioa(mut self, ioa: Ioa, auto_return: bool) -> Self {
        self.related_ioa = ioa.value();
        self.related_auto_return = auto_return;
        self
    }

    /// Periodic auto-transmit interval for this point.
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = Some(interval);
        self
    }

    /// Periodic `on_timer` callback interval for this point.
    pub fn with_timer_interval(mut self, interval: Duration) -> Self {
        self.timer_interval = Some(interval);
        self
    }

    /// Mark the point read-only: `set_value`/commands are rejected even if
    /// the type would otherwise allow them.
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Add this point to interrogation group `group`, used by `QOI=21..36`
    /// interrogation dispatch (`group = QOI - 20`). Counter types only admit
    /// groups 1..=4 (counter-interrogation's QCC groups); other types admit
    /// 1..=16.
    pub fn with_group(mut self, group: u8) -> Result<Self> {
        let max = if self.type_id == TypeId::IntegratedTotals { 4 } else { 16 };
        if group == 0 || group > max {
            return Err(ConfigError::InvalidGroup(group).into());
        }
        self.groups.insert(group);
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.related_auto_return && self.related_ioa == NO_RELATED_IOA {
            return Err(ConfigError::AutoReturnWithoutRelatedIoa.into());
        }
        if self.command_mode == CommandMode::SelectAndExecute && !self.type_id.is_control() {
            return Err(ConfigError::NotSelectable(self.type_id.standard_name()).into());
        }
        Ok(())
    }

    pub(crate) fn build(self, station: Weak<Station>, role: Role) -> Result<std::sync::Arc<DataPoint>> {
        self.validate()?;
        let value = self
            .initial_value
            .unwrap_or_else(|| crate::information::default_value_for(self.type_id));
        validate_value_domain(&value)?;
        let now = SystemTime::now();
        let info = if self.type_id.is_control() {
            Information::new_command(self.type_id, value, CommandInfo::execute(), None, now)?
        } else {
            Information::new_monitoring(self.type_id, value, Quality::default(), None, now)?
        };
        let info = if self.readonly { info.into_readonly() } else { info };

        Ok(std::sync::Arc::new(DataPoint {
            ioa: self.ioa,
            type_id: self.type_id,
            station,
            role,
            info: RwLock::new(info),
            command_mode: Mutex::new(self.command_mode),
            related_ioa: AtomicU32::new(self.related_ioa),
            related_auto_return: AtomicBool::new(self.related_auto_return),
            selected_by: Mutex::new(None),
            select_deadline: Mutex::new(None),
            report_interval_ms: AtomicU32::new(
                self.report_interval.map_or(0, |d| d.as_millis() as u32),
            ),
            timer_interval_ms: AtomicU32::new(
                self.timer_interval.map_or(0, |d| d.as_millis() as u32),
            ),
            last_sent_at: Mutex::new(None),
            next_timer_at: Mutex::new(None),
            on_receive: RwLock::new(None),
            on_before_read: RwLock::new(None),
            on_before_auto_transmit: RwLock::new(None),
            on_timer: RwLock::new(None),
            groups: self.groups,
        }))
    }
}

/// Originator address + connection identity that currently holds a
/// select-and-execute selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Originator address (0..=255) from the selecting I-frame.
    pub originator_address: u8,
    /// Opaque identifier of the connection/session that selected, used to
    /// reject an execute arriving over a different connection.
    pub connection_id: u64,
}

/// One information-object address: current value, command/select policy,
/// and callback slots. Cheaply cloneable via `Arc`; shared between the
/// owning `Station` and whichever connection/session last touched it.
pub struct DataPoint {
    ioa: Ioa,
    type_id: TypeId,
    station: Weak<Station>,
    role: Role,
    info: RwLock<Information>,
    command_mode: Mutex<CommandMode>,
    related_ioa: AtomicU32,
    related_auto_return: AtomicBool,
    selected_by: Mutex<Option<Selection>>,
    select_deadline: Mutex<Option<Instant>>,
    report_interval_ms: AtomicU32,
    timer_interval_ms: AtomicU32,
    last_sent_at: Mutex<Option<Instant>>,
    next_timer_at: Mutex<Option<Instant>>,
    on_receive: RwLock<Option<Callback<IncomingMessage, ()>>>,
    on_before_read: RwLock<Option<Callback<(), ResponseState>>>,
    on_before_auto_transmit: RwLock<Option<Callback<(), ResponseState>>>,
    on_timer: RwLock<Option<Callback<(), ()>>>,
    groups: std::collections::HashSet<u8>,
}

impl DataPoint {
    /// Information object address.
    pub const fn ioa(&self) -> Ioa {
        self.ioa
    }

    /// Wire type id.
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Owning station, if it still exists.
    pub fn station(&self) -> Option<std::sync::Arc<Station>> {
        self.station.upgrade()
    }

    /// Detach from the owning station (called on removal); clears callbacks
    /// so no further invocation can occur.
    pub fn detach(&self) {
        *self.on_receive.write().unwrap() = None;
        *self.on_before_read.write().unwrap() = None;
        *self.on_before_auto_transmit.write().unwrap() = None;
        *self.on_timer.write().unwrap() = None;
    }

    /// Interrogation groups this point belongs to.
    pub fn groups(&self) -> &std::collections::HashSet<u8> {
        &self.groups
    }

    /// Whether this point should respond to a general/group interrogation
    /// carrying qualifier `qoi`: `QOI=20` (station interrogation) matches
    /// every point; `QOI=21..=36` matches only points in group `QOI-20`.
    pub fn matches_qoi(&self, qoi: u8) -> bool {
        match qoi {
            20 => true,
            21..=36 => self.groups.contains(&(qoi - 20)),
            _ => false,
        }
    }

    /// Related information object address, or `None` if unset.
    pub fn related_ioa(&self) -> Option<Ioa> {
        let raw = self.related_ioa.load(Ordering::Relaxed);
        (raw != NO_RELATED_IOA).then(|| Ioa::new(raw))
    }

    /// Set the related information object address.
    pub fn set_related_ioa(&self, ioa: Option<Ioa>) {
        self.related_ioa
            .store(ioa.map_or(NO_RELATED_IOA, |v| v.value()), Ordering::Relaxed);
    }

    /// Whether executing this command point auto-returns the related
    /// monitoring point's value.
    pub fn related_auto_return(&self) -> bool {
        self.related_auto_return.load(Ordering::Relaxed)
    }

    /// Enable/disable auto-return; requires a related IOA already set.
    pub fn set_related_auto_return(&self, value: bool) -> Result<()> {
        if value && self.related_ioa().is_none() {
            return Err(ConfigError::AutoReturnWithoutRelatedIoa.into());
        }
        self.related_auto_return.store(value, Ordering::Relaxed);
        Ok(())
    }

    /// Current command mode (direct vs. select-and-execute).
    pub fn command_mode(&self) -> CommandMode {
        *self.command_mode.lock().unwrap()
    }

    /// Change the command mode.
    pub fn set_command_mode(&self, mode: CommandMode) -> Result<()> {
        if mode == CommandMode::SelectAndExecute && !self.type_id.is_control() {
            return Err(ConfigError::NotSelectable(self.type_id.standard_name()).into());
        }
        *self.command_mode.lock().unwrap() = mode;
        Ok(())
    }

    /// Originator address currently holding a select-and-execute selection,
    /// if any and not expired.
    pub fn selected_by_originator(&self) -> Option<u8> {
        self.current_selection().map(|s| s.originator_address)
    }

    fn current_selection(&self) -> Option<Selection> {
        let mut deadline = self.select_deadline.lock().unwrap();
        if let Some(at) = *deadline {
            if Instant::now() >= at {
                *deadline = None;
                *self.selected_by.lock().unwrap() = None;
                return None;
            }
        }
        *self.selected_by.lock().unwrap()
    }

    /// Record a select, held by `selection` until `deadline`. Fails with
    /// `SelectConflict` if a different originator already holds it.
    pub fn select(&self, selection: Selection, deadline: Instant) -> Result<()> {
        let mut held = self.selected_by.lock().unwrap();
        if let Some(existing) = *held {
            if existing.connection_id != selection.connection_id
                || existing.originator_address != selection.originator_address
            {
                return Err(ApplicationError::SelectConflict.into());
            }
        }
        *held = Some(selection);
        *self.select_deadline.lock().unwrap() = Some(deadline);
        Ok(())
    }

    /// Consume the current selection for an execute. Fails with
    /// `NoSelection`/`SelectionExpired`/`SelectConflict` as appropriate.
    pub fn consume_selection(&self, selection: Selection) -> Result<()> {
        let current = self
            .current_selection()
            .ok_or(ApplicationError::NoSelection)?;
        if current.connection_id != selection.connection_id
            || current.originator_address != selection.originator_address
        {
            return Err(ApplicationError::SelectConflict.into());
        }
        *self.selected_by.lock().unwrap() = None;
        *self.select_deadline.lock().unwrap() = None;
        Ok(())
    }

    /// Cancel any active selection (a deselect command, or connection loss).
    pub fn cancel_selection(&self) {
        *self.selected_by.lock().unwrap() = None;
        *self.select_deadline.lock().unwrap() = None;
    }

    /// If a selection is held and its deadline has just passed as of `now`,
    /// clear it and return it so the caller can emit a negative ACT_TERM to
    /// the selecting peer. Returns `None` both when there is no selection
    /// and when one is held but not yet expired.
    pub fn take_expired_selection(&self, now: Instant) -> Option<Selection> {
        let mut deadline = self.select_deadline.lock().unwrap();
        match *deadline {
            Some(at) if now >= at => {
                *deadline = None;
                self.selected_by.lock().unwrap().take()
            }
            _ => None,
        }
    }

    /// Periodic auto-transmit interval, `None` if disabled.
    pub fn report_interval(&self) -> Option<Duration> {
        match self.report_interval_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms as u64)),
        }
    }

    /// Change the auto-transmit interval; `None` disables it.
    pub fn set_report_interval(&self, interval: Option<Duration>) {
        self.report_interval_ms.store(
            interval.map_or(0, |d| d.as_millis() as u32),
            Ordering::Relaxed,
        );
    }

    /// Periodic `on_timer` interval, `None` if disabled.
    pub fn timer_interval(&self) -> Option<Duration> {
        match self.timer_interval_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms as u64)),
        }
    }

    /// When the point's auto-transmit is next due, given `tick_rate` as the
    /// scheduler's minimum granularity.
    pub fn due_for_report(&self, now: Instant) -> bool {
        match self.report_interval() {
            None => false,
            Some(interval) => match *self.last_sent_at.lock().unwrap() {
                None => true,
                Some(last) => now.duration_since(last) >= interval,
            },
        }
    }

    /// When the point's `on_timer` callback is next due.
    pub fn due_for_timer(&self, now: Instant) -> bool {
        match self.timer_interval() {
            None => false,
            Some(_) => match *self.next_timer_at.lock().unwrap() {
                None => true,
                Some(at) => now >= at,
            },
        }
    }

    fn mark_sent(&self, now: Instant) {
        *self.last_sent_at.lock().unwrap() = Some(now);
    }

    /// Fire `on_timer`, catching panics, and reschedule the next firing.
    pub fn fire_timer(&self, now: Instant) {
        if let Some(interval) = self.timer_interval() {
            invoke_guarded(&self.on_timer.read().unwrap(), (), ());
            *self.next_timer_at.lock().unwrap() = Some(now + interval);
        }
    }

    /// Snapshot the current value/quality/timestamp.
    pub fn information(&self) -> Information {
        self.info.read().unwrap().clone()
    }

    /// Current value only.
    pub fn value(&self) -> DataValue {
        self.info.read().unwrap().value.clone()
    }

    /// Current quality descriptor only.
    pub fn quality(&self) -> Quality {
        self.info.read().unwrap().quality
    }

    /// Apply a locally-originated value update (not from the network): runs
    /// domain validation, rejects on `readonly`, updates `processed_at`.
    pub fn set_value(&self, value: DataValue, quality: Quality) -> Result<()> {
        validate_value_domain(&value)?;
        if !value_matches_type(self.type_id, &value) {
            return Err(ApplicationError::NotCommandType.into());
        }
        let now = SystemTime::now();
        self.info
            .write()
            .unwrap()
            .set_value_and_quality(value, quality, now)?;
        Ok(())
    }

    /// Apply a network-originated update, then invoke `on_receive`. Used by
    /// the server/client dispatch paths, which have already decoded the
    /// ASDU and validated the type match.
    pub fn apply_from_network(&self, value: DataValue, quality: Quality, now: SystemTime) -> Result<()> {
        validate_value_domain(&value)?;
        {
            let mut info = self.info.write().unwrap();
            info.set_value_and_quality(value, quality, now)?;
        }
        let snapshot = self.information();
        invoke_guarded(
            &self.on_receive.read().unwrap(),
            IncomingMessage {
                information: snapshot,
                from_network: true,
            },
            (),
        );
        Ok(())
    }

    /// Run `on_before_read`, returning whether the read should proceed. No
    /// callback means the read always proceeds.
    pub fn before_read(&self) -> ResponseState {
        invoke_guarded(&self.on_before_read.read().unwrap(), (), ResponseState::Failure)
    }

    /// Read the point, honoring `on_before_read` and role (client-initiated
    /// reads only make sense against a remote/Client-role station).
    pub fn read(&self) -> Result<Information> {
        if self.role != Role::Client {
            return Err(ApplicationError::WrongRole.into());
        }
        match self.before_read() {
            ResponseState::Failure => Err(ApplicationError::Readonly.into()),
            _ => Ok(self.information()),
        }
    }

    /// Run `on_before_auto_transmit`, then mark the point as sent if it
    /// returns anything but `Failure`. Server-role only, per §4.8.2.
    pub fn transmit(&self, now: Instant) -> Result<Option<Information>> {
        if self.role != Role::Server {
            return Err(ApplicationError::WrongRole.into());
        }
        match invoke_guarded(
            &self.on_before_auto_transmit.read().unwrap(),
            (),
            ResponseState::Failure,
        ) {
            ResponseState::Failure => Ok(None),
            _ => {
                self.mark_sent(now);
                Ok(Some(self.information()))
            }
        }
    }

    /// Install/replace the `on_receive` callback.
    pub fn set_on_receive<F>(&self, f: F)
    where
        F: Fn(IncomingMessage) + Send + Sync + 'static,
    {
        *self.on_receive.write().unwrap() = Some(std::sync::Arc::new(move |msg| f(msg)));
    }

    /// Install/replace the `on_before_read` callback. Server-role only
    /// (a client never answers reads of its own points).
    pub fn set_on_before_read<F>(&self, f: F) -> Result<()>
    where
        F: Fn() -> ResponseState + Send + Sync + 'static,
    {
        if self.role != Role::Server {
            return Err(ApplicationError::WrongRoleCallback.into());
        }
        *self.on_before_read.write().unwrap() = Some(std::sync::Arc::new(move |()| f()));
        Ok(())
    }

    /// Install/replace the `on_before_auto_transmit` callback. Server-role
    /// only.
    pub fn set_on_before_auto_transmit<F>(&self, f: F) -> Result<()>
    where
        F: Fn() -> ResponseState + Send + Sync + 'static,
    {
        if self.role != Role::Server {
            return Err(ApplicationError::WrongRoleCallback.into());
        }
        *self.on_before_auto_transmit.write().unwrap() = Some(std::sync::Arc::new(move |()| f()));
        Ok(())
    }

    /// Install/replace the `on_timer` callback.
    pub fn set_on_timer<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_timer.write().unwrap() = Some(std::sync::Arc::new(move |()| f()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::Station;

    fn server_point(type_id: TypeId) -> std::sync::Arc<DataPoint> {
        let station = Station::new(1, Role::Server).unwrap();
        station
            .add_point(PointBuilder::new(Ioa::new(1), type_id))
            .unwrap()
    }

    #[test]
    fn readonly_point_rejects_set_value() {
        let station = Station::new(1, Role::Server).unwrap();
        let point = station
            .add_point(PointBuilder::new(Ioa::new(1), TypeId::SinglePoint).readonly())
            .unwrap();
        assert!(point
            .set_value(DataValue::Single(true), Quality::default())
            .is_err());
    }

    #[test]
    fn non_readonly_point_accepts_set_value() {
        let point = server_point(TypeId::SinglePoint);
        assert!(point
            .set_value(DataValue::Single(true), Quality::default())
            .is_ok());
    }

    #[test]
    fn select_then_execute_succeeds() {
        let point = server_point(TypeId::SingleCommand);
        let sel = Selection {
            originator_address: 1,
            connection_id: 42,
        };
        point.select(sel, Instant::now() + Duration::from_millis(100)).unwrap();
        assert_eq!(point.selected_by_originator(), Some(1));
        point.consume_selection(sel).unwrap();
        assert_eq!(point.selected_by_originator(), None);
    }

    #[test]
    fn conflicting_select_is_rejected() {
        let point = server_point(TypeId::SingleCommand);
        let a = Selection {
            originator_address: 1,
            connection_id: 1,
        };
        let b = Selection {
            originator_address: 2,
            connection_id: 2,
        };
        point.select(a, Instant::now() + Duration::from_secs(1)).unwrap();
        assert!(point.select(b, Instant::now() + Duration::from_secs(1)).is_err());
    }

    #[test]
    fn execute_without_select_fails() {
        let point = server_point(TypeId::SingleCommand);
        let sel = Selection {
            originator_address: 1,
            connection_id: 1,
        };
        assert!(point.consume_selection(sel).is_err());
    }

    #[test]
    fn related_auto_return_requires_related_ioa() {
        let point = server_point(TypeId::SingleCommand);
        assert!(point.set_related_auto_return(true).is_err());
        point.set_related_ioa(Some(Ioa::new(5)));
        assert!(point.set_related_auto_return(true).is_ok());
    }

    #[test]
    fn read_rejected_for_server_role_point() {
        let point = server_point(TypeId::SinglePoint);
        assert!(point.read().is_err());
    }

    #[test]
    fn group_membership_matches_qoi() {
        let station = Station::new(1, Role::Server).unwrap();
        let point = station
            .add_point(
                PointBuilder::new(Ioa::new(1), TypeId::SinglePoint)
                    .with_group(3)
                    .unwrap(),
            )
            .unwrap();
        assert!(point.matches_qoi(20));
        assert!(point.matches_qoi(23));
        assert!(!point.matches_qoi(22));
    }

    #[test]
    fn counter_group_rejects_out_of_range() {
        assert!(PointBuilder::new(Ioa::new(1), TypeId::IntegratedTotals)
            .with_group(5)
            .is_err());
    }

    #[test]
    fn transmit_rejected_for_client_role_point() {
        let station = Station::new(1, Role::Client).unwrap();
        let point = station
            .add_point(PointBuilder::new(Ioa::new(1), TypeId::SinglePoint))
            .unwrap();
        assert!(point.transmit(Instant::now()).is_err());
    }
}
