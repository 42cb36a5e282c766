//! Client-side connection state machine: the six states and transition
//! rules from SPEC_FULL.md §4.6. Pure state — no socket I/O lives here;
//! `ClientEngine` in `client.rs` drives a `Connection` from the bytes it
//! reads and writes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ApciParameters, Init};
use crate::correlator::Correlator;
use crate::station::Station;
use crate::window::{RecvWindow, SendWindow};

/// Fixed reconnect delay entered from `ClosedAwaitReconnect`.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// One of the six connection states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// No transport, no pending attempt.
    Closed,
    /// `connect()` issued; TCP/APCI handshake in flight.
    ClosedAwaitOpen,
    /// Connection lost; reconnect scheduled.
    ClosedAwaitReconnect,
    /// Data transfer active.
    Open,
    /// Transport/APCI up, STARTDT not yet confirmed (or hot-standby mute).
    OpenMuted,
    /// `disconnect()` issued; waiting for the transport to actually close.
    OpenAwaitClosed,
}

/// Bootstrap action the caller must perform after `STARTDT_CON`, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitAction {
    /// Send C_IC_NA_1 (COT=ACTIVATION, QOI=20/STATION) to the broadcast CA.
    GeneralInterrogation,
    /// Send C_CS_NA_1 to the broadcast CA with the local clock.
    ClockSync,
}

/// A transition's side effect the caller must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open the transport and begin the APCI handshake.
    BeginConnect,
    /// Send STARTDT_ACT.
    SendStartDtAct,
    /// Run the configured init sequence.
    RunInit(Vec<InitAction>),
    /// Close the transport.
    CloseTransport,
    /// Schedule a reconnect after `RECONNECT_DELAY`.
    ScheduleReconnect,
}

/// Client-side connection: state machine plus the per-link resources it
/// owns (windows, correlator, attached stations).
pub struct Connection {
    state: ConnState,
    init: Init,
    apci: ApciParameters,
    reopen_intent: AtomicBool,
    send_window: SendWindow,
    recv_window: RecvWindow,
    correlator: Correlator,
    stations: HashMap<u16, Arc<Station>>,
    originator_address: u8,
}

impl Connection {
    /// Create a connection in the `Closed` state.
    pub fn new(apci: ApciParameters, init: Init, originator_address: u8) -> Self {
        Self {
            state: ConnState::Closed,
            init,
            send_window: SendWindow::new(apci.k),
            recv_window: RecvWindow::new(apci.w),
            apci,
            reopen_intent: AtomicBool::new(false),
            correlator: Correlator::new(),
            stations: HashMap::new(),
            originator_address,
        }
    }

    /// Current state.
    pub const fn state(&self) -> ConnState {
        self.state
    }

    /// APCI windowing/timer parameters.
    pub const fn apci_params(&self) -> ApciParameters {
        self.apci
    }

    /// Outbound sequence window.
    pub fn send_window(&mut self) -> &mut SendWindow {
        &mut self.send_window
    }

    /// Inbound sequence window.
    pub fn recv_window(&mut self) -> &mut RecvWindow {
        &mut self.recv_window
    }

    /// Command correlator for this link.
    pub fn correlator(&mut self) -> &mut Correlator {
        &mut self.correlator
    }

    /// Originator address this connection stamps on outbound commands.
    pub const fn originator_address(&self) -> u8 {
        self.originator_address
    }

    /// Attach a station reachable through this connection.
    pub fn attach_station(&mut self, station: Arc<Station>) {
        self.stations.insert(station.common_address(), station);
    }

    /// Look up an attached station by common address.
    pub fn station(&self, ca: u16) -> Option<Arc<Station>> {
        self.stations.get(&ca).cloned()
    }

    /// All attached stations.
    pub fn stations(&self) -> impl Iterator<Item = &Arc<Station>> {
        self.stations.values()
    }

    /// User requested a connection attempt. Per §4.6: from `Closed`, begins
    /// the handshake; from `OpenAwaitClosed`, stays put but marks intent to
    /// reopen once the close completes; otherwise a no-op (already
    /// connecting/connected).
    pub fn connect(&mut self) -> Vec<Effect> {
        match self.state {
            ConnState::Closed => {
                self.state = ConnState::ClosedAwaitOpen;
                vec![Effect::BeginConnect]
            }
            ConnState::OpenAwaitClosed => {
                self.reopen_intent.store(true, Ordering::Relaxed);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// User requested disconnection. Per §4.6: from `ClosedAwaitOpen`,
    /// downgrades to `OpenAwaitClosed` (so the in-flight handshake is torn
    /// down once it lands); from `Open`/`OpenMuted`, begins closing;
    /// idempotent otherwise.
    pub fn disconnect(&mut self) -> Vec<Effect> {
        match self.state {
            ConnState::ClosedAwaitOpen => {
                self.state = ConnState::OpenAwaitClosed;
                Vec::new()
            }
            ConnState::Open | ConnState::OpenMuted => {
                self.state = ConnState::OpenAwaitClosed;
                vec![Effect::CloseTransport]
            }
            _ => Vec::new(),
        }
    }

    /// TCP connected and the APCI layer is ready to exchange U-frames.
    /// Moves `ClosedAwaitOpen` to `OpenMuted` and resets sequence state.
    pub fn on_transport_ready(&mut self) -> Vec<Effect> {
        if self.state != ConnState::ClosedAwaitOpen {
            return Vec::new();
        }
        self.send_window.reset();
        self.recv_window.reset();
        self.state = ConnState::OpenMuted;
        if self.init == Init::Muted {
            Vec::new()
        } else {
            vec![Effect::SendStartDtAct]
        }
    }

    /// Peer confirmed STARTDT. Moves `OpenMuted` to `Open` and returns the
    /// configured bootstrap sequence.
    pub fn on_startdt_confirmed(&mut self) -> Vec<Effect> {
        if self.state != ConnState::OpenMuted {
            return Vec::new();
        }
        self.state = ConnState::Open;
        let actions = match self.init {
            Init::None | Init::Muted => Vec::new(),
            Init::Interrogation => vec![InitAction::GeneralInterrogation],
            Init::ClockSync => vec![InitAction::ClockSync],
            Init::All => vec![InitAction::GeneralInterrogation, InitAction::ClockSync],
        };
        if actions.is_empty() {
            Vec::new()
        } else {
            vec![Effect::RunInit(actions)]
        }
    }

    /// The transport reported the connection lost (I/O error, T1/T3
    /// timeout, peer reset). From `Open`/`OpenMuted`, schedules a
    /// reconnect; from `OpenAwaitClosed`, completes the requested close
    /// (and immediately reopens if `connect()` was called meanwhile).
    pub fn on_connection_lost(&mut self) -> Vec<Effect> {
        match self.state {
            ConnState::Open | ConnState::OpenMuted => {
                self.state = ConnState::ClosedAwaitReconnect;
                vec![Effect::ScheduleReconnect]
            }
            ConnState::OpenAwaitClosed => self.complete_close(),
            ConnState::ClosedAwaitOpen => {
                self.state = ConnState::ClosedAwaitReconnect;
                vec![Effect::ScheduleReconnect]
            }
            _ => Vec::new(),
        }
    }

    fn complete_close(&mut self) -> Vec<Effect> {
        if self.reopen_intent.swap(false, Ordering::Relaxed) {
            self.state = ConnState::ClosedAwaitOpen;
            vec![Effect::BeginConnect]
        } else {
            self.state = ConnState::Closed;
            Vec::new()
        }
    }

    /// The scheduled reconnect delay elapsed; re-enter `ClosedAwaitOpen`.
    pub fn on_reconnect_due(&mut self) -> Vec<Effect> {
        if self.state != ConnState::ClosedAwaitReconnect {
            return Vec::new();
        }
        self.state = ConnState::ClosedAwaitOpen;
        vec![Effect::BeginConnect]
    }

    /// True if the link is in `Open` and can carry I-frames.
    pub const fn is_active(&self) -> bool {
        matches!(self.state, ConnState::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        Connection::new(ApciParameters::default(), Init::All, 0)
    }

    #[test]
    fn full_happy_path() {
        let mut conn = connection();
        assert_eq!(conn.connect(), vec![Effect::BeginConnect]);
        assert_eq!(conn.state(), ConnState::ClosedAwaitOpen);

        assert_eq!(conn.on_transport_ready(), vec![Effect::SendStartDtAct]);
        assert_eq!(conn.state(), ConnState::OpenMuted);

        let effects = conn.on_startdt_confirmed();
        assert_eq!(conn.state(), ConnState::Open);
        assert_eq!(
            effects,
            vec![Effect::RunInit(vec![
                InitAction::GeneralInterrogation,
                InitAction::ClockSync
            ])]
        );
    }

    #[test]
    fn disconnect_while_awaiting_open_downgrades() {
        let mut conn = connection();
        conn.connect();
        assert_eq!(conn.disconnect(), Vec::new());
        assert_eq!(conn.state(), ConnState::OpenAwaitClosed);
    }

    #[test]
    fn connect_while_await_closed_marks_reopen_intent() {
        let mut conn = connection();
        conn.connect();
        conn.on_transport_ready();
        conn.on_startdt_confirmed();
        conn.disconnect();
        assert_eq!(conn.state(), ConnState::OpenAwaitClosed);

        assert_eq!(conn.connect(), Vec::new());
        assert_eq!(conn.state(), ConnState::OpenAwaitClosed);

        assert_eq!(conn.on_connection_lost(), vec![Effect::BeginConnect]);
        assert_eq!(conn.state(), ConnState::ClosedAwaitOpen);
    }

    #[test]
    fn lost_connection_from_open_schedules_reconnect() {
        let mut conn = connection();
        conn.connect();
        conn.on_transport_ready();
        conn.on_startdt_confirmed();
        assert_eq!(conn.on_connection_lost(), vec![Effect::ScheduleReconnect]);
        assert_eq!(conn.state(), ConnState::ClosedAwaitReconnect);

        assert_eq!(conn.on_reconnect_due(), vec![Effect::BeginConnect]);
        assert_eq!(conn.state(), ConnState::ClosedAwaitOpen);
    }

    #[test]
    fn muted_init_skips_startdt_act_and_bootstrap() {
        let mut conn = Connection::new(ApciParameters::default(), Init::Muted, 0);
        conn.connect();
        assert_eq!(conn.on_transport_ready(), Vec::new());
        assert_eq!(conn.state(), ConnState::OpenMuted);
    }

    #[test]
    fn init_none_runs_no_bootstrap() {
        let mut conn = Connection::new(ApciParameters::default(), Init::None, 0);
        conn.connect();
        conn.on_transport_ready();
        assert_eq!(conn.on_startdt_confirmed(), Vec::new());
        assert_eq!(conn.state(), ConnState::Open);
    }
}
