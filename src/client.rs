//! IEC 60870-5-104 client (controlling station) engine.
//!
//! Grounded on `server.rs`'s accept-loop/session shape, turned inside out: a
//! pool of named remotes instead of a pool of accepted peers, each driven by
//! its own [`Connection`] state machine (`connection.rs`) instead of raw
//! windows, and commands resolved through `correlator.rs` instead of the
//! teacher's inline "match the next ASDU's COT".

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::{Duration, SystemTime};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::codec::Framed;

use crate::callback::{invoke_guarded, Callback};
use crate::codec::{Apdu, Iec104Codec};
use crate::config::{validate_command_timeout, ApciParameters, Init};
use crate::connection::{Connection, ConnState, Effect, InitAction, RECONNECT_DELAY};
use crate::correlator::{CommandKey, Expected, Outcome};
use crate::encode::encode_command_object;
use crate::error::{ApplicationError, Iec104Error, Result};
use crate::information::{system_time_to_cp56, CommandInfo, QualifierOfCommand};
use crate::parser::parse_asdu;
use crate::point::{DataPoint, PointBuilder};
use crate::station::{Role, Station, BROADCAST_CA};
use crate::types::{
    Apci, Asdu, AsduHeader, Cot, DataValue, DoublePointValue, InformationObject, Ioa,
    MonitoringReport, TypeId, UFunction,
};

/// Default command resolution timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Client-wide bootstrap configuration, validated once in [`ClientEngine::new`].
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// How long a command/interrogation/read waits for resolution before
    /// [`ApplicationError::CommandTimeout`].
    pub command_timeout: Duration,
}

impl ClientConfig {
    /// Configuration with the default command timeout.
    pub fn new() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Override the command resolution timeout.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    fn validate(&self) -> Result<()> {
        validate_command_timeout(self.command_timeout)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-remote bootstrap configuration: address, APCI windowing, and the
/// STARTDT_CON bootstrap policy.
#[derive(Debug, Clone, Copy)]
pub struct RemoteConfig {
    /// TCP address of the controlled station.
    pub addr: SocketAddr,
    /// APCI windowing/timer parameters.
    pub apci: ApciParameters,
    /// Bootstrap action run once STARTDT is confirmed.
    pub init: Init,
    /// Originator address stamped on outbound commands from this link.
    pub originator_address: u8,
}

impl RemoteConfig {
    /// Configuration with every default except `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            apci: ApciParameters::default(),
            init: Init::default(),
            originator_address: 0,
        }
    }

    /// Override the APCI windowing parameters.
    pub fn apci(mut self, apci: ApciParameters) -> Self {
        self.apci = apci;
        self
    }

    /// Override the bootstrap policy.
    pub fn init(mut self, init: Init) -> Self {
        self.init = init;
        self
    }

    /// Override the originator address.
    pub fn originator_address(mut self, addr: u8) -> Self {
        self.originator_address = addr;
        self
    }
}

/// Events the client emits on its `ClientEvent` channel, mirroring
/// `ServerEvent`'s role on the server side.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A remote's transport came up and STARTDT was confirmed.
    Connected(String),
    /// A remote's transport went down; a reconnect may be scheduled.
    Disconnected(String),
    /// A monitoring-direction report was applied to a point.
    Report {
        /// Remote name.
        remote: String,
        /// Common address the report was addressed to.
        common_address: u16,
        /// Information object address.
        ioa: u32,
    },
    /// A message was rejected or malformed; the session was not torn down.
    UnexpectedMessage {
        /// Originating remote.
        remote: String,
        /// Why the message was rejected.
        reason: String,
    },
    /// A session-level error that did tear the session down.
    Error {
        /// Originating remote.
        remote: String,
        /// Error description.
        reason: String,
    },
}

/// Signal sent from the public API into a remote's driving task.
enum ConnCtrl {
    Connect,
    Disconnect,
}

struct ManagedRemote {
    name: String,
    addr: SocketAddr,
    conn: AsyncMutex<Connection>,
    out_tx: mpsc::Sender<Asdu>,
    out_rx: AsyncMutex<Option<mpsc::Receiver<Asdu>>>,
    ctrl_tx: mpsc::Sender<ConnCtrl>,
    ctrl_rx: AsyncMutex<Option<mpsc::Receiver<ConnCtrl>>>,
    waiters: StdMutex<HashMap<CommandKey, oneshot::Sender<Outcome>>>,
    /// Pending `C_RD_NA_1` reads, keyed by `(common_address, ioa)` since the
    /// reply carries the point's own monitoring TypeID rather than
    /// `ReadCommand` — the one case the type-keyed `Correlator` can't track.
    pending_reads: StdMutex<HashMap<(u16, u32), oneshot::Sender<MonitoringReport>>>,
}

/// The client (controlling-station) engine: owns a pool of named remotes and
/// drives each through its own [`Connection`] state machine.
pub struct ClientEngine {
    config: ClientConfig,
    remotes: RwLock<HashMap<String, Arc<ManagedRemote>>>,
    event_tx: mpsc::Sender<ClientEvent>,
    event_rx: AsyncMutex<Option<mpsc::Receiver<ClientEvent>>>,
    on_new_station: RwLock<Option<Callback<(String, u16), ()>>>,
    on_new_point: RwLock<Option<Callback<(String, u16, u32), ()>>>,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl ClientEngine {
    /// Build a new engine from `config`. Fails if the config is invalid.
    pub fn new(config: ClientConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let (event_tx, event_rx) = mpsc::channel(256);
        Ok(Arc::new(Self {
            config,
            remotes: RwLock::new(HashMap::new()),
            event_tx,
            event_rx: AsyncMutex::new(Some(event_rx)),
            on_new_station: RwLock::new(None),
            on_new_point: RwLock::new(None),
            tasks: AsyncMutex::new(Vec::new()),
        }))
    }

    /// Subscribe to client events. Can only be called once.
    pub async fn subscribe(&self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.event_rx.lock().await.take()
    }

    /// Install the callback fired the first time a station is discovered on
    /// a remote (a station ASDU arrives with an unseen common address).
    pub fn set_on_new_station<F>(&self, f: F)
    where
        F: Fn(String, u16) + Send + Sync + 'static,
    {
        *self.on_new_station.write().unwrap() = Some(Arc::new(move |(remote, ca)| f(remote, ca)));
    }

    /// Install the callback fired the first time a point is discovered
    /// under a station (an information object arrives at an unseen IOA).
    pub fn set_on_new_point<F>(&self, f: F)
    where
        F: Fn(String, u16, u32) + Send + Sync + 'static,
    {
        *self.on_new_point.write().unwrap() =
            Some(Arc::new(move |(remote, ca, ioa)| f(remote, ca, ioa)));
    }

    /// Add a remote, spawning its driving task. Fails if `name` already
    /// exists or the remote's APCI parameters are invalid.
    pub fn add_remote(self: &Arc<Self>, name: impl Into<String>, remote_config: RemoteConfig) -> Result<()> {
        let name = name.into();
        remote_config.apci.validate()?;
        let mut remotes = self.remotes.write().unwrap();
        if remotes.contains_key(&name) {
            return Err(crate::error::ConfigError::InvalidAddress(
                format!("remote {name} already exists").into(),
            )
            .into());
        }

        let conn = Connection::new(remote_config.apci, remote_config.init, remote_config.originator_address);
        let (out_tx, out_rx) = mpsc::channel(64);
        let (ctrl_tx, ctrl_rx) = mpsc::channel(8);
        let remote = Arc::new(ManagedRemote {
            name: name.clone(),
            addr: remote_config.addr,
            conn: AsyncMutex::new(conn),
            out_tx,
            out_rx: AsyncMutex::new(Some(out_rx)),
            ctrl_tx,
            ctrl_rx: AsyncMutex::new(Some(ctrl_rx)),
            waiters: StdMutex::new(HashMap::new()),
            pending_reads: StdMutex::new(HashMap::new()),
        });
        remotes.insert(name, remote.clone());
        drop(remotes);

        let engine = Arc::clone(self);
        let task = tokio::spawn(async move { engine.run_remote(remote).await });
        if let Ok(mut tasks) = self.tasks.try_lock() {
            tasks.push(task);
        }
        Ok(())
    }

    fn get_remote(&self, name: &str) -> Result<Arc<ManagedRemote>> {
        self.remotes
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Iec104Error::invalid_asdu(format!("unknown remote {name}")))
    }

    /// Remove a remote and abort its driving task.
    pub async fn remove_remote(&self, name: &str) -> bool {
        self.remotes.write().unwrap().remove(name).is_some()
    }

    /// Signal a remote to connect. A no-op if already connecting/connected.
    pub async fn connect(&self, name: &str) -> Result<()> {
        let remote = self.get_remote(name)?;
        remote
            .ctrl_tx
            .send(ConnCtrl::Connect)
            .await
            .map_err(|_| Iec104Error::ChannelClosed)
    }

    /// Signal a remote to disconnect.
    pub async fn disconnect(&self, name: &str) -> Result<()> {
        let remote = self.get_remote(name)?;
        remote
            .ctrl_tx
            .send(ConnCtrl::Disconnect)
            .await
            .map_err(|_| Iec104Error::ChannelClosed)
    }

    /// Current connection state of a remote.
    pub async fn state(&self, name: &str) -> Option<ConnState> {
        let remote = self.remotes.read().unwrap().get(name).cloned()?;
        Some(remote.conn.lock().await.state())
    }

    /// Stations discovered (or pre-attached) on a remote.
    pub async fn stations(&self, name: &str) -> Result<Vec<Arc<Station>>> {
        let remote = self.get_remote(name)?;
        Ok(remote.conn.lock().await.stations().cloned().collect())
    }

    /// Stop every remote's driving task.
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    async fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event).await;
    }

    async fn ensure_station(&self, remote: &Arc<ManagedRemote>, ca: u16) -> Result<Arc<Station>> {
        let mut conn = remote.conn.lock().await;
        if let Some(station) = conn.station(ca) {
            return Ok(station);
        }
        let station = Station::new(ca, Role::Client)?;
        conn.attach_station(station.clone());
        drop(conn);
        invoke_guarded(&self.on_new_station.read().unwrap(), (remote.name.clone(), ca), ());
        Ok(station)
    }

    fn ensure_point(&self, remote: &Arc<ManagedRemote>, station: &Arc<Station>, ioa: Ioa, type_id: TypeId) -> Result<Arc<DataPoint>> {
        if let Some(point) = station.get_point(ioa) {
            return Ok(point);
        }
        let point = station.add_point(PointBuilder::new(ioa, type_id))?;
        invoke_guarded(
            &self.on_new_point.read().unwrap(),
            (remote.name.clone(), station.common_address(), ioa.value()),
            (),
        );
        Ok(point)
    }

    /// Drives one remote's entire lifecycle: connect, APCI handshake, data
    /// transfer session, reconnect-on-loss, repeating until the engine drops
    /// the remote's channels.
    async fn run_remote(self: Arc<Self>, remote: Arc<ManagedRemote>) {
        let mut ctrl_rx = match remote.ctrl_rx.lock().await.take() {
            Some(rx) => rx,
            None => return,
        };
        let mut out_rx = match remote.out_rx.lock().await.take() {
            Some(rx) => rx,
            None => return,
        };

        'outer: loop {
            let state = remote.conn.lock().await.state();
            match state {
                ConnState::Closed => match ctrl_rx.recv().await {
                    Some(ConnCtrl::Connect) => {
                        remote.conn.lock().await.connect();
                    }
                    Some(ConnCtrl::Disconnect) => continue 'outer,
                    None => break 'outer,
                },
                ConnState::ClosedAwaitReconnect => {
                    sleep(RECONNECT_DELAY).await;
                    remote.conn.lock().await.on_reconnect_due();
                    continue 'outer;
                }
                ConnState::OpenAwaitClosed => {
                    remote.conn.lock().await.on_connection_lost();
                    continue 'outer;
                }
                ConnState::Open | ConnState::OpenMuted => continue 'outer,
                ConnState::ClosedAwaitOpen => {}
            }

            let t0 = remote.conn.lock().await.apci_params().t0;
            let stream = match tokio::time::timeout(t0, TcpStream::connect(remote.addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(_)) | Err(_) => {
                    remote.conn.lock().await.on_connection_lost();
                    continue 'outer;
                }
            };
            stream.set_nodelay(true).ok();
            let mut framed = Framed::new(stream, Iec104Codec::new());

            let effects = remote.conn.lock().await.on_transport_ready();
            if effects.contains(&Effect::SendStartDtAct)
                && framed.send(Apdu::u_frame(UFunction::StartDtAct)).await.is_err()
            {
                remote.conn.lock().await.on_connection_lost();
                continue 'outer;
            }

            let t3 = remote.conn.lock().await.apci_params().t3;
            let mut t3_ticker = interval(t3);
            t3_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_recv = Instant::now();

            'session: loop {
                tokio::select! {
                    frame = framed.next() => {
                        match frame {
                            Some(Ok(apdu)) => {
                                last_recv = Instant::now();
                                match self.handle_inbound(&remote, &mut framed, apdu).await {
                                    Ok(()) => {}
                                    Err(e) if e.is_non_fatal_decode_error() => {
                                        self.emit(ClientEvent::UnexpectedMessage {
                                            remote: remote.name.clone(),
                                            reason: e.to_string(),
                                        })
                                        .await;
                                    }
                                    Err(e) => {
                                        self.emit(ClientEvent::Error {
                                            remote: remote.name.clone(),
                                            reason: e.to_string(),
                                        })
                                        .await;
                                        break 'session;
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                self.emit(ClientEvent::Error {
                                    remote: remote.name.clone(),
                                    reason: e.to_string(),
                                })
                                .await;
                                break 'session;
                            }
                            None => break 'session,
                        }
                    }
                    Some(asdu) = out_rx.recv() => {
                        let mut conn = remote.conn.lock().await;
                        if !conn.is_active() || !conn.send_window().can_send() {
                            drop(conn);
                            continue;
                        }
                        let seq = conn.send_window().record_sent();
                        let ack = conn.recv_window().acknowledge();
                        drop(conn);
                        if framed.send(Apdu::i_frame(seq, ack, asdu)).await.is_err() {
                            break 'session;
                        }
                    }
                    ctrl = ctrl_rx.recv() => {
                        match ctrl {
                            Some(ConnCtrl::Disconnect) => {
                                let effects = remote.conn.lock().await.disconnect();
                                if effects.contains(&Effect::CloseTransport) {
                                    break 'session;
                                }
                            }
                            Some(ConnCtrl::Connect) => {}
                            None => break 'session,
                        }
                    }
                    _ = t3_ticker.tick() => {
                        if last_recv.elapsed() >= t3
                            && framed.send(Apdu::u_frame(UFunction::TestFrAct)).await.is_err()
                        {
                            break 'session;
                        }
                    }
                }
            }

            drop(framed);
            self.emit(ClientEvent::Disconnected(remote.name.clone())).await;
            remote.conn.lock().await.on_connection_lost();
        }
    }

    async fn handle_inbound(
        &self,
        remote: &Arc<ManagedRemote>,
        framed: &mut Framed<TcpStream, Iec104Codec>,
        apdu: Apdu,
    ) -> Result<()> {
        match apdu.apci {
            Apci::UFrame { function } => {
                match function {
                    UFunction::StartDtCon => {
                        let effects = remote.conn.lock().await.on_startdt_confirmed();
                        self.emit(ClientEvent::Connected(remote.name.clone())).await;
                        for effect in effects {
                            if let Effect::RunInit(actions) = effect {
                                for action in actions {
                                    self.run_init_action(remote, framed, action).await?;
                                }
                            }
                        }
                    }
                    UFunction::StopDtCon => {}
                    UFunction::TestFrAct => {
                        framed
                            .send(Apdu::u_frame(UFunction::TestFrCon))
                            .await
                            .map_err(|_| Iec104Error::protocol_static("send failed"))?;
                    }
                    UFunction::TestFrCon => {}
                    _ => {}
                }
                Ok(())
            }
            Apci::SFrame { recv_seq } => {
                remote.conn.lock().await.send_window().acknowledge(recv_seq)?;
                Ok(())
            }
            Apci::IFrame { send_seq, recv_seq } => {
                let should_ack = {
                    let mut conn = remote.conn.lock().await;
                    conn.send_window().acknowledge(recv_seq)?;
                    conn.recv_window().accept(send_seq)?;
                    conn.recv_window().should_acknowledge()
                };
                if should_ack {
                    let vr = remote.conn.lock().await.recv_window().acknowledge();
                    framed
                        .send(Apdu::s_frame(vr))
                        .await
                        .map_err(|_| Iec104Error::protocol_static("send failed"))?;
                }
                if let Some(asdu) = apdu.asdu {
                    self.dispatch_asdu(remote, asdu).await?;
                }
                Ok(())
            }
        }
    }

    async fn run_init_action(
        &self,
        remote: &Arc<ManagedRemote>,
        framed: &mut Framed<TcpStream, Iec104Codec>,
        action: InitAction,
    ) -> Result<()> {
        let asdu = match action {
            InitAction::GeneralInterrogation => Asdu::interrogation_command(BROADCAST_CA, 20),
            InitAction::ClockSync => {
                let cp56 = system_time_to_cp56(SystemTime::now(), 0, false, false);
                Asdu::clock_sync_command(BROADCAST_CA, cp56)
            }
        };
        let mut conn = remote.conn.lock().await;
        if !conn.send_window().can_send() {
            return Ok(());
        }
        let seq = conn.send_window().record_sent();
        let ack = conn.recv_window().acknowledge();
        drop(conn);
        framed
            .send(Apdu::i_frame(seq, ack, asdu))
            .await
            .map_err(|_| Iec104Error::protocol_static("send failed"))
    }

    async fn dispatch_asdu(&self, remote: &Arc<ManagedRemote>, asdu: Asdu) -> Result<()> {
        let header = asdu.header.clone();
        let ca = header.common_address;

        if header.type_id == TypeId::EndOfInit {
            return Ok(());
        }

        if header.type_id.is_control() {
            let ioa = Ioa::from_bytes(&asdu.raw_data).unwrap_or(Ioa::new(0));
            {
                let mut conn = remote.conn.lock().await;
                conn.correlator().observe(ca, header.type_id, ioa, header.cot, header.negative);
            }
            self.resolve_waiters(remote).await;
            return Ok(());
        }

        let station = self.ensure_station(remote, ca).await?;
        let reports = parse_asdu(&asdu)?;
        for report in reports {
            let ioa = Ioa::new(report.ioa);
            if header.cot == Cot::Request {
                if let Some(tx) = remote.pending_reads.lock().unwrap().remove(&(ca, report.ioa)) {
                    let _ = tx.send(report.clone());
                }
            }
            let point = self.ensure_point(remote, &station, ioa, header.type_id)?;
            let report_ioa = report.ioa;
            point.apply_from_network(report.value, report.quality, SystemTime::now())?;
            self.emit(ClientEvent::Report {
                remote: remote.name.clone(),
                common_address: ca,
                ioa: report_ioa,
            })
            .await;
        }
        Ok(())
    }

    async fn resolve_waiters(&self, remote: &Arc<ManagedRemote>) {
        let keys: Vec<CommandKey> = remote.waiters.lock().unwrap().keys().copied().collect();
        for key in keys {
            let resolved = remote.conn.lock().await.correlator().take_resolved(key);
            if let Some(pending) = resolved {
                if let Some(tx) = remote.waiters.lock().unwrap().remove(&key) {
                    let _ = tx.send(pending.outcome());
                }
            }
        }
    }

    /// Register a pending command, send `asdu`, and wait for resolution or
    /// timeout.
    async fn issue_command(&self, remote: &Arc<ManagedRemote>, key: CommandKey, expected: Expected, asdu: Asdu) -> Result<Outcome> {
        let timeout = self.config.command_timeout;
        let (tx, rx) = oneshot::channel();
        remote.waiters.lock().unwrap().insert(key, tx);
        {
            let mut conn = remote.conn.lock().await;
            if !conn.is_active() {
                remote.waiters.lock().unwrap().remove(&key);
                return Err(Iec104Error::NotConnected);
            }
            conn.correlator().register(key, expected, Instant::now() + timeout);
        }
        if remote.out_tx.send(asdu).await.is_err() {
            remote.waiters.lock().unwrap().remove(&key);
            return Err(Iec104Error::ChannelClosed);
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            _ => {
                remote.waiters.lock().unwrap().remove(&key);
                Err(ApplicationError::CommandTimeout.into())
            }
        }
    }

    /// Send a general (station) interrogation and wait for ACT_CON..ACT_TERM.
    pub async fn general_interrogation(&self, remote_name: &str, ca: u16) -> Result<Outcome> {
        let remote = self.get_remote(remote_name)?;
        let key = CommandKey::new(ca, TypeId::InterrogationCommand, Ioa::new(0));
        let asdu = Asdu::interrogation_command(ca, 20);
        self.issue_command(&remote, key, Expected::AwaitConTerm, asdu).await
    }

    /// Send a counter interrogation for `group` (0 = general, 1..=4 = a
    /// specific counter group) and wait for ACT_CON..ACT_TERM.
    pub async fn counter_interrogation(&self, remote_name: &str, ca: u16, group: u8, freeze_or_reset: u8) -> Result<Outcome> {
        let remote = self.get_remote(remote_name)?;
        let key = CommandKey::new(ca, TypeId::CounterInterrogation, Ioa::new(0));
        let qcc = (group & 0x3F) | ((freeze_or_reset & 0x03) << 6);
        let mut asdu = Asdu::new(AsduHeader::new(TypeId::CounterInterrogation, 1, Cot::Activation, ca));
        asdu.objects.push(InformationObject::new(Ioa::new(0), bytes::Bytes::copy_from_slice(&[qcc])));
        self.issue_command(&remote, key, Expected::AwaitConTerm, asdu).await
    }

    /// Send a clock synchronization command; resolves on ACT_CON only (no
    /// ACT_TERM follows a clock sync).
    pub async fn clock_sync(&self, remote_name: &str, ca: u16, time: Option<SystemTime>) -> Result<Outcome> {
        let remote = self.get_remote(remote_name)?;
        let key = CommandKey::new(ca, TypeId::ClockSync, Ioa::new(0));
        let cp56 = system_time_to_cp56(time.unwrap_or_else(SystemTime::now), 0, false, false);
        let asdu = Asdu::clock_sync_command(ca, cp56);
        self.issue_command(&remote, key, Expected::AwaitCon, asdu).await
    }

    /// Send a C_TS_NA_1 test command; resolves on ACT_CON only.
    pub async fn test_command(&self, remote_name: &str, ca: u16, test_sequence: u16) -> Result<Outcome> {
        let remote = self.get_remote(remote_name)?;
        let key = CommandKey::new(ca, TypeId::TestCommand, Ioa::new(0));
        let mut asdu = Asdu::new(AsduHeader::new(TypeId::TestCommand, 1, Cot::Activation, ca));
        asdu.objects.push(InformationObject::new(
            Ioa::new(0),
            bytes::Bytes::copy_from_slice(&test_sequence.to_le_bytes()),
        ));
        self.issue_command(&remote, key, Expected::AwaitCon, asdu).await
    }

    /// Send a C_RP_NA_1 reset-process command; resolves on ACT_CON only.
    pub async fn reset_process(&self, remote_name: &str, ca: u16, qualifier: u8) -> Result<Outcome> {
        let remote = self.get_remote(remote_name)?;
        let key = CommandKey::new(ca, TypeId::ResetProcess, Ioa::new(0));
        let mut asdu = Asdu::new(AsduHeader::new(TypeId::ResetProcess, 1, Cot::Activation, ca));
        asdu.objects.push(InformationObject::new(Ioa::new(0), bytes::Bytes::copy_from_slice(&[qualifier])));
        self.issue_command(&remote, key, Expected::AwaitCon, asdu).await
    }

    fn command_asdu(&self, ca: u16, ioa: Ioa, type_id: TypeId, value: &DataValue, command: &CommandInfo) -> Result<Asdu> {
        let obj = encode_command_object(ioa, type_id, value, command)?;
        let mut asdu = Asdu::new(AsduHeader::new(type_id, 1, Cot::Activation, ca));
        asdu.objects.push(obj);
        Ok(asdu)
    }

    /// Issue a single command (C_SC_NA_1). `select` chooses between a
    /// select-before-execute select and a direct/select execute.
    pub async fn single_command(
        &self,
        remote_name: &str,
        ca: u16,
        ioa: Ioa,
        value: bool,
        qualifier: QualifierOfCommand,
        select: bool,
    ) -> Result<Outcome> {
        let remote = self.get_remote(remote_name)?;
        let key = CommandKey::new(ca, TypeId::SingleCommand, ioa);
        let command = CommandInfo { qualifier, select };
        let asdu = self.command_asdu(ca, ioa, TypeId::SingleCommand, &DataValue::Single(value), &command)?;
        let expected = if select { Expected::AwaitCon } else { Expected::AwaitConTerm };
        self.issue_command(&remote, key, expected, asdu).await
    }

    /// Issue a double command (C_DC_NA_1).
    pub async fn double_command(
        &self,
        remote_name: &str,
        ca: u16,
        ioa: Ioa,
        value: DoublePointValue,
        qualifier: QualifierOfCommand,
        select: bool,
    ) -> Result<Outcome> {
        let remote = self.get_remote(remote_name)?;
        let key = CommandKey::new(ca, TypeId::DoubleCommand, ioa);
        let command = CommandInfo { qualifier, select };
        let asdu = self.command_asdu(ca, ioa, TypeId::DoubleCommand, &DataValue::Double(value), &command)?;
        let expected = if select { Expected::AwaitCon } else { Expected::AwaitConTerm };
        self.issue_command(&remote, key, expected, asdu).await
    }

    /// Issue a short-floating-point setpoint command (C_SE_NC_1).
    pub async fn setpoint_float(
        &self,
        remote_name: &str,
        ca: u16,
        ioa: Ioa,
        value: f32,
        qualifier: u8,
        select: bool,
    ) -> Result<Outcome> {
        let remote = self.get_remote(remote_name)?;
        let key = CommandKey::new(ca, TypeId::SetpointFloat, ioa);
        let command = CommandInfo {
            qualifier: QualifierOfCommand::from_u8(qualifier),
            select,
        };
        let asdu = self.command_asdu(ca, ioa, TypeId::SetpointFloat, &DataValue::Float(value), &command)?;
        let expected = if select { Expected::AwaitCon } else { Expected::AwaitConTerm };
        self.issue_command(&remote, key, expected, asdu).await
    }

    /// Send a C_RD_NA_1 read request and wait for the spontaneous reply
    /// carrying the point's current value.
    pub async fn read_point(&self, remote_name: &str, ca: u16, ioa: Ioa) -> Result<MonitoringReport> {
        let remote = self.get_remote(remote_name)?;
        {
            let conn = remote.conn.lock().await;
            if !conn.is_active() {
                return Err(Iec104Error::NotConnected);
            }
        }
        let (tx, rx) = oneshot::channel();
        remote.pending_reads.lock().unwrap().insert((ca, ioa.value()), tx);

        let mut asdu = Asdu::new(AsduHeader::new(TypeId::ReadCommand, 1, Cot::Request, ca));
        asdu.objects.push(InformationObject::new(ioa, bytes::Bytes::new()));
        if remote.out_tx.send(asdu).await.is_err() {
            remote.pending_reads.lock().unwrap().remove(&(ca, ioa.value()));
            return Err(Iec104Error::ChannelClosed);
        }

        let timeout = self.config.command_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(report)) => Ok(report),
            _ => {
                remote.pending_reads.lock().unwrap().remove(&(ca, ioa.value()));
                Err(ApplicationError::CommandTimeout.into())
            }
        }
    }
}
