//! IEC 60870-5-104 server (controlled station) engine.
//!
//! Grounded on `Server.h`'s public surface: an accept loop bounded by
//! `max_open_connections`, one session per accepted peer (its own
//! `SendWindow`/`RecvWindow`/codec), and dispatch of C_* ASDUs against the
//! owned [`Station`]s' [`DataPoint`]s. The per-session I/O loop mirrors
//! `client.rs`'s framing/U-frame handling but is driven by `tokio::select!`
//! since a session has to react to inbound frames, outbound pushes (from
//! spontaneous transmits and periodic inventory), and the t3 keepalive all
//! at once.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::codec::Framed;

use crate::callback::{invoke_guarded, Callback, ResponseState};
use crate::codec::{Apdu, Iec104Codec};
use crate::config::{validate_max_open_connections, validate_tick_rate, ApciParameters};
use crate::decode::{decode_clock_sync, decode_command_object, decode_qcc, decode_qoi};
use crate::encode::encode_information_object;
use crate::error::{ApplicationError, Iec104Error, Result, TransportError};
use crate::information::cp56_to_system_time;
use crate::point::{DataPoint, Selection};
use crate::station::{CauseOfInitialization, Role, Station};
use crate::types::{Apci, Asdu, AsduHeader, Cot, Ioa, TypeId, UFunction};
use crate::window::{RecvWindow, SendWindow};

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 2404;

/// Default tick rate driving the periodic selection-cleanup/inventory loop.
pub const DEFAULT_TICK_RATE: Duration = Duration::from_millis(100);

/// Default select-and-execute selection lifetime.
pub const DEFAULT_SELECT_TIMEOUT: Duration = Duration::from_millis(100);

/// Max ASDU payload: `MAX_APDU_LENGTH` minus the 4-byte APCI control field.
pub const DEFAULT_MAX_ASDU_SIZE: usize = crate::types::MAX_APDU_LENGTH - 4;

/// Server bootstrap configuration, validated once in [`ServerEngine::new`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Local address to bind, e.g. `"0.0.0.0"`.
    pub bind_ip: String,
    /// Local TCP port.
    pub tcp_port: u16,
    /// Interval of the selection-cleanup/periodic-inventory tick.
    pub tick_rate: Duration,
    /// How long a select-and-execute selection lives before expiring.
    pub select_timeout: Duration,
    /// Cap on simultaneously open connections; 0 means unlimited.
    pub max_open_connections: u16,
    /// APCI windowing/timeout parameters applied to every session.
    pub apci: ApciParameters,
    /// Max encoded ASDU size; interrogation/inventory batches are split to
    /// stay under this.
    pub max_asdu_size: usize,
}

impl ServerConfig {
    /// Configuration with every default except `bind_ip`.
    pub fn new(bind_ip: impl Into<String>) -> Self {
        Self {
            bind_ip: bind_ip.into(),
            tcp_port: DEFAULT_PORT,
            tick_rate: DEFAULT_TICK_RATE,
            select_timeout: DEFAULT_SELECT_TIMEOUT,
            max_open_connections: 0,
            apci: ApciParameters::default(),
            max_asdu_size: DEFAULT_MAX_ASDU_SIZE,
        }
    }

    /// Set the TCP port.
    pub fn tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = port;
        self
    }

    /// Set the selection-cleanup/inventory tick rate.
    pub fn tick_rate(mut self, rate: Duration) -> Self {
        self.tick_rate = rate;
        self
    }

    /// Set the select-and-execute selection lifetime.
    pub fn select_timeout(mut self, timeout: Duration) -> Self {
        self.select_timeout = timeout;
        self
    }

    /// Set the cap on simultaneously open connections; 0 means unlimited.
    pub fn max_open_connections(mut self, max: u16) -> Self {
        self.max_open_connections = max;
        self
    }

    /// Override the APCI windowing parameters.
    pub fn apci(mut self, apci: ApciParameters) -> Self {
        self.apci = apci;
        self
    }

    fn validate(&self) -> Result<()> {
        validate_tick_rate(self.tick_rate)?;
        validate_max_open_connections(self.max_open_connections)?;
        self.apci.validate()
    }
}

/// Events the server emits on its `ServerEvent` channel, mirroring
/// `ClientEvent`'s role on the client side.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A peer connected (TCP accepted; STARTDT not yet necessarily sent).
    Connected(SocketAddr),
    /// A peer's session ended.
    Disconnected(SocketAddr),
    /// A message was rejected or malformed; the session was not torn down.
    UnexpectedMessage {
        /// Originating peer.
        peer: SocketAddr,
        /// Why the message was rejected.
        reason: String,
    },
    /// A session-level error that did tear the session down.
    Error(String),
}

struct OutboundSession {
    common_address: u16,
    sender: mpsc::Sender<Asdu>,
    /// `(common_address, ioa)` pairs this session holds select-and-execute
    /// locks on, so a disconnect can release exactly its own holds.
    selections: Vec<(u16, Ioa)>,
}

/// `raw_data` carries the leading 3-byte IOA for every system/command ASDU
/// `Asdu::parse` produces (it never splits `objects` out); callers that only
/// care about the body past the IOA go through here.
fn object_body(raw_data: &bytes::Bytes) -> Result<&[u8]> {
    if raw_data.len() < 3 {
        return Err(crate::error::DecodeError::Truncated {
            expected: 3,
            actual: raw_data.len(),
        }
        .into());
    }
    Ok(&raw_data[3..])
}

/// The server (controlled-station) engine: owns zero or more [`Station`]s
/// and accepts connections from controlling stations.
pub struct ServerEngine {
    config: ServerConfig,
    stations: RwLock<HashMap<u16, Arc<Station>>>,
    running: Arc<AtomicBool>,
    open_connections: Arc<AtomicU16>,
    next_session_id: AtomicU64,
    sessions: Arc<RwLock<HashMap<u64, OutboundSession>>>,
    event_tx: mpsc::Sender<ServerEvent>,
    event_rx: AsyncMutex<Option<mpsc::Receiver<ServerEvent>>>,
    on_connect: RwLock<Option<Callback<SocketAddr, bool>>>,
    on_clock_sync: RwLock<Option<Callback<(SocketAddr, SystemTime), ResponseState>>>,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl ServerEngine {
    /// Build a new engine from `config`. Fails if the config is invalid.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let (event_tx, event_rx) = mpsc::channel(256);
        Ok(Arc::new(Self {
            config,
            stations: RwLock::new(HashMap::new()),
            running: Arc::new(AtomicBool::new(false)),
            open_connections: Arc::new(AtomicU16::new(0)),
            next_session_id: AtomicU64::new(1),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            event_rx: AsyncMutex::new(Some(event_rx)),
            on_connect: RwLock::new(None),
            on_clock_sync: RwLock::new(None),
            tasks: AsyncMutex::new(Vec::new()),
        }))
    }

    /// Subscribe to server events. Can only be called once.
    pub async fn subscribe(&self) -> Option<mpsc::Receiver<ServerEvent>> {
        self.event_rx.lock().await.take()
    }

    /// Install the connection-accept policy callback; default accepts
    /// every peer subject only to `max_open_connections`.
    pub fn set_on_connect<F>(&self, f: F)
    where
        F: Fn(SocketAddr) -> bool + Send + Sync + 'static,
    {
        *self.on_connect.write().unwrap() = Some(Arc::new(move |peer| f(peer)));
    }

    /// Install the clock-sync decision callback; default accepts.
    pub fn set_on_clock_sync<F>(&self, f: F)
    where
        F: Fn(SocketAddr, SystemTime) -> ResponseState + Send + Sync + 'static,
    {
        *self.on_clock_sync.write().unwrap() = Some(Arc::new(move |(peer, time)| f(peer, time)));
    }

    /// Add a station under this server. Fails if `common_address` is
    /// already present or reserved.
    pub fn add_station(self: &Arc<Self>, common_address: u16) -> Result<Arc<Station>> {
        let mut stations = self.stations.write().unwrap();
        if stations.contains_key(&common_address) {
            return Err(crate::error::ConfigError::InvalidAddress(
                format!("common address {common_address} already exists").into(),
            )
            .into());
        }
        let station = Station::new(common_address, Role::Server)?;
        stations.insert(common_address, station.clone());
        Ok(station)
    }

    /// Look up a station by common address.
    pub fn get_station(&self, common_address: u16) -> Option<Arc<Station>> {
        self.stations.read().unwrap().get(&common_address).cloned()
    }

    /// Whether `common_address` has a station.
    pub fn has_station(&self, common_address: u16) -> bool {
        self.stations.read().unwrap().contains_key(&common_address)
    }

    /// Remove a station.
    pub fn remove_station(&self, common_address: u16) -> bool {
        self.stations.write().unwrap().remove(&common_address).is_some()
    }

    /// All owned stations.
    pub fn stations(&self) -> Vec<Arc<Station>> {
        self.stations.read().unwrap().values().cloned().collect()
    }

    /// Whether the accept loop and tick loop are running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of currently open connections.
    pub fn open_connection_count(&self) -> u16 {
        self.open_connections.load(Ordering::SeqCst)
    }

    /// Whether any connection is open.
    pub fn has_open_connections(&self) -> bool {
        self.open_connection_count() > 0
    }

    /// Start the accept loop and the tick loop. Idempotent: calling this
    /// while already running is a no-op, matching `Server::start()`.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let addr = format!("{}:{}", self.config.bind_ip, self.config.tcp_port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(TransportError::Io(e).into());
            }
        };

        let accept_engine = self.clone();
        let accept_task = tokio::spawn(async move { accept_engine.accept_loop(listener).await });

        let tick_engine = self.clone();
        let tick_task = tokio::spawn(async move { tick_engine.tick_loop().await });

        let mut tasks = self.tasks.lock().await;
        tasks.push(accept_task);
        tasks.push(tick_task);
        Ok(())
    }

    /// Stop the accept loop, tick loop, and every active session.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    async fn emit_event(&self, event: ServerEvent) {
        let _ = self.event_tx.send(event).await;
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        while self.running.load(Ordering::SeqCst) {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    self.emit_event(ServerEvent::Error(e.to_string())).await;
                    continue;
                }
            };

            let max = self.config.max_open_connections;
            if max != 0 && self.open_connections.load(Ordering::SeqCst) >= max {
                drop(stream);
                continue;
            }

            let allowed = invoke_guarded(&self.on_connect.read().unwrap(), peer, true);
            if !allowed {
                drop(stream);
                continue;
            }

            stream.set_nodelay(true).ok();
            self.open_connections.fetch_add(1, Ordering::SeqCst);

            let engine = self.clone();
            let task = tokio::spawn(async move {
                engine.run_session(stream, peer).await;
                engine.open_connections.fetch_sub(1, Ordering::SeqCst);
            });
            self.tasks.lock().await.push(task);
        }
    }

    /// Drives two per-tick passes: expiring stale select-and-execute
    /// selections (mirrors `Server::cleanupSelections()`) and §4.8.2's
    /// periodic inventory of every due point.
    async fn tick_loop(self: Arc<Self>) {
        let mut ticker = interval(self.config.tick_rate);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            let now = Instant::now();
            for station in self.stations() {
                for point in station.points_sorted() {
                    if let Some(selection) = point.take_expired_selection(now) {
                        self.send_negative_act_term(&point, &selection).await;
                    }
                }
            }
            self.send_periodic_inventory().await.ok();
        }
    }

    async fn send_negative_act_term(&self, point: &Arc<DataPoint>, selection: &Selection) {
        let Some(station) = point.station() else { return };
        let mut header = AsduHeader::new(
            point.type_id(),
            1,
            Cot::ActivationTermination,
            station.common_address(),
        );
        header.negative = true;
        header.originator = selection.originator_address;
        let mut asdu = Asdu::new(header);
        asdu.objects.push(crate::types::InformationObject::new(
            point.ioa(),
            bytes::Bytes::new(),
        ));
        self.send_to_session(selection.connection_id, asdu).await;
    }

    async fn send_to_session(&self, session_id: u64, asdu: Asdu) {
        let sender = self
            .sessions
            .read()
            .unwrap()
            .get(&session_id)
            .map(|s| s.sender.clone());
        if let Some(sender) = sender {
            let _ = sender.send(asdu).await;
        }
    }

    /// Push a spontaneous ASDU (COT=Spontaneous) to every session currently
    /// receiving data from `common_address`'s station.
    async fn broadcast(&self, common_address: u16, asdu: Asdu) {
        let senders: Vec<_> = self
            .sessions
            .read()
            .unwrap()
            .values()
            .filter(|s| s.common_address == common_address)
            .map(|s| s.sender.clone())
            .collect();
        for sender in senders {
            let _ = sender.send(asdu.clone()).await;
        }
    }

    /// Transmit a single point's current value as a spontaneous ASDU to
    /// every connected session. Server-role point only.
    pub async fn transmit(&self, point: &Arc<DataPoint>) -> Result<()> {
        self.transmit_with_cot(point, Cot::Spontaneous).await
    }

    async fn transmit_with_cot(&self, point: &Arc<DataPoint>, cot: Cot) -> Result<()> {
        let station = point.station().ok_or(ApplicationError::WrongRole)?;
        let info = point.information();
        let obj = encode_information_object(point.ioa(), point.type_id(), &info)?;
        let mut asdu = Asdu::new(AsduHeader::new(point.type_id(), 1, cot, station.common_address()));
        asdu.objects.push(obj);
        self.broadcast(station.common_address(), asdu).await;
        Ok(())
    }

    /// Run the periodic-inventory pass for every due point across every
    /// station, honoring each point's `on_before_auto_transmit` gate and
    /// emitting `COT=PERIODIC` per §4.8.2. Mirrors
    /// `Server::sendPeriodicInventory()`.
    pub async fn send_periodic_inventory(&self) -> Result<()> {
        let now = Instant::now();
        for station in self.stations() {
            for point in station.points_sorted() {
                if !point.due_for_report(now) {
                    continue;
                }
                if point.transmit(now)?.is_some() {
                    self.transmit_with_cot(&point, Cot::Periodic).await?;
                }
            }
        }
        Ok(())
    }

    /// Build and broadcast an M_EI_NA_1 end-of-initialization ASDU for
    /// `common_address`.
    pub async fn send_end_of_initialization(
        &self,
        common_address: u16,
        coi: CauseOfInitialization,
    ) -> Result<()> {
        let station = self
            .get_station(common_address)
            .ok_or_else(|| Iec104Error::invalid_asdu("unknown common address"))?;
        let asdu = station.end_of_initialization_asdu(coi)?;
        self.broadcast(common_address, asdu).await;
        Ok(())
    }

    fn clone(self: &Arc<Self>) -> Arc<Self> {
        Arc::clone(self)
    }

    async fn run_session(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let mut framed = Framed::new(stream, Iec104Codec::new());
        let mut send_window = SendWindow::new(self.config.apci.k);
        let mut recv_window = RecvWindow::new(self.config.apci.w);
        let (out_tx, mut out_rx) = mpsc::channel::<Asdu>(64);
        // Registered with common_address=0 (broadcast wildcard) until the
        // peer's first command tells us which station it is addressing;
        // `broadcast` below matches against the station a session has
        // actually talked to.
        self.sessions.write().unwrap().insert(
            session_id,
            OutboundSession {
                common_address: 0,
                sender: out_tx,
                selections: Vec::new(),
            },
        );
        self.emit_event(ServerEvent::Connected(peer)).await;

        let mut active = false;
        let mut last_recv = Instant::now();
        let mut test_fr_interval = interval(self.config.apci.t3);
        test_fr_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'session: loop {
            tokio::select! {
                frame = framed.next() => {
                    match frame {
                        Some(Ok(apdu)) => {
                            last_recv = Instant::now();
                            match self
                                .handle_inbound(
                                    &mut framed,
                                    &mut send_window,
                                    &mut recv_window,
                                    &mut active,
                                    session_id,
                                    peer,
                                    apdu,
                                )
                                .await
                            {
                                Ok(()) => {}
                                Err(e) if e.is_non_fatal_decode_error() => {
                                    self.emit_event(ServerEvent::UnexpectedMessage {
                                        peer,
                                        reason: e.to_string(),
                                    })
                                    .await;
                                }
                                Err(e) => {
                                    self.emit_event(ServerEvent::Error(e.to_string())).await;
                                    break 'session;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            self.emit_event(ServerEvent::Error(e.to_string())).await;
                            break 'session;
                        }
                        None => break 'session,
                    }
                }
                Some(asdu) = out_rx.recv(), if active => {
                    if !send_window.can_send() {
                        continue;
                    }
                    let seq = send_window.record_sent();
                    let apdu = Apdu::i_frame(seq, recv_window.acknowledge(), asdu);
                    if framed.send(apdu).await.is_err() {
                        break 'session;
                    }
                }
                _ = test_fr_interval.tick() => {
                    if last_recv.elapsed() >= self.config.apci.t3
                        && framed.send(Apdu::u_frame(UFunction::TestFrAct)).await.is_err()
                    {
                        break 'session;
                    }
                }
            }
        }

        let held = self
            .sessions
            .write()
            .unwrap()
            .remove(&session_id)
            .map(|s| s.selections)
            .unwrap_or_default();
        for (common_address, ioa) in held {
            if let Some(station) = self.get_station(common_address) {
                if let Some(point) = station.get_point(ioa) {
                    point.cancel_selection();
                }
            }
        }
        self.emit_event(ServerEvent::Disconnected(peer)).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_inbound(
        &self,
        framed: &mut Framed<TcpStream, Iec104Codec>,
        send_window: &mut SendWindow,
        recv_window: &mut RecvWindow,
        active: &mut bool,
        session_id: u64,
        peer: SocketAddr,
        apdu: Apdu,
    ) -> Result<()> {
        match apdu.apci {
            Apci::UFrame { function } => {
                match function {
                    UFunction::StartDtAct => {
                        *active = true;
                        send_window.reset();
                        recv_window.reset();
                        framed
                            .send(Apdu::u_frame(UFunction::StartDtCon))
                            .await
                            .map_err(|_| Iec104Error::protocol_static("send failed"))?;
                    }
                    UFunction::StopDtAct => {
                        *active = false;
                        framed
                            .send(Apdu::u_frame(UFunction::StopDtCon))
                            .await
                            .map_err(|_| Iec104Error::protocol_static("send failed"))?;
                    }
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
                send_window.acknowledge(recv_seq)?;
                Ok(())
            }
            Apci::IFrame { send_seq, recv_seq } => {
                send_window.acknowledge(recv_seq)?;
                recv_window.accept(send_seq)?;
                if recv_window.should_acknowledge() {
                    let vr = recv_window.acknowledge();
                    framed
                        .send(Apdu::s_frame(vr))
                        .await
                        .map_err(|_| Iec104Error::protocol_static("send failed"))?;
                }
                if let Some(asdu) = apdu.asdu {
                    self.dispatch_asdu(session_id, peer, asdu).await?;
                }
                Ok(())
            }
        }
    }

    async fn dispatch_asdu(&self, session_id: u64, peer: SocketAddr, asdu: Asdu) -> Result<()> {
        let common_address = asdu.header.common_address;
        if let Some(sender) = self.sessions.write().unwrap().get_mut(&session_id) {
            sender.common_address = common_address;
        }

        if common_address == crate::station::BROADCAST_CA
            && matches!(
                asdu.header.type_id,
                TypeId::InterrogationCommand | TypeId::CounterInterrogation
            )
        {
            return self.dispatch_broadcast_interrogation(session_id, &asdu).await;
        }

        let station = match self.get_station(common_address) {
            Some(station) => station,
            None => {
                return Err(crate::error::DecodeError::UnknownCa(common_address).into());
            }
        };

        match asdu.header.type_id {
            TypeId::InterrogationCommand => {
                self.handle_interrogation(session_id, &station, &asdu).await
            }
            TypeId::CounterInterrogation => {
                self.handle_counter_interrogation(session_id, &station, &asdu).await
            }
            TypeId::ReadCommand => self.handle_read(session_id, &station, &asdu).await,
            TypeId::ClockSync => self.handle_clock_sync(session_id, peer, &station, &asdu).await,
            TypeId::TestCommand | TypeId::TestCommandTime56 => {
                self.handle_test_command(session_id, &station, &asdu).await
            }
            TypeId::ResetProcess => self.handle_reset_process(session_id, &station, &asdu).await,
            t if t.is_control() => {
                self.handle_command(session_id, &station, &asdu).await
            }
            _ => Err(Iec104Error::invalid_asdu(format!(
                "unexpected type id {} in command direction",
                asdu.header.type_id
            ))),
        }
    }

    /// Fan-out for a general/counter interrogation addressed to the
    /// broadcast CA (65535): a single ACT_CON/ACT_TERM pair (carrying the
    /// broadcast CA, per the incoming header) bracket one batch per locally
    /// owned station, per §4.8's "If CA=65535, the batch is emitted for each
    /// local station."
    async fn dispatch_broadcast_interrogation(&self, session_id: u64, asdu: &Asdu) -> Result<()> {
        self.send_con(session_id, asdu, false).await;

        for station in self.stations() {
            let batches = if asdu.header.type_id == TypeId::InterrogationCommand {
                let qoi = decode_qoi(object_body(&asdu.raw_data)?)?;
                let matching: Vec<_> = station
                    .points_sorted()
                    .into_iter()
                    .filter(|p| p.matches_qoi(qoi))
                    .collect();
                self.batch_points(&station, &matching, qoi)?
            } else {
                let (group, _freeze_or_reset) = decode_qcc(object_body(&asdu.raw_data)?)?;
                let qoi_equivalent = if group == 0 { 20 } else { 20 + group };
                let matching: Vec<_> = station
                    .points_sorted()
                    .into_iter()
                    .filter(|p| p.type_id() == TypeId::IntegratedTotals && p.matches_qoi(qoi_equivalent))
                    .collect();
                let cot_value = Cot::RequestedByGeneralCounter.as_u8() + group;
                self.batch_points(&station, &matching, cot_value)?
            };
            for batch in batches {
                self.send_to_session(session_id, batch).await;
            }
        }

        self.send_term(session_id, asdu).await;
        Ok(())
    }

    /// QOI-filtered general/group interrogation: ACT_CON, then one ASDU per
    /// matching point (batched up to `max_asdu_size`), then ACT_TERM.
    async fn handle_interrogation(&self, session_id: u64, station: &Arc<Station>, asdu: &Asdu) -> Result<()> {
        let qoi = decode_qoi(object_body(&asdu.raw_data)?)?;
        self.send_con(session_id, asdu, false).await;

        let matching: Vec<_> = station
            .points_sorted()
            .into_iter()
            .filter(|p| p.matches_qoi(qoi))
            .collect();

        // `Cot::InterrogatedByStation..=InterrogatedByGroup16` (20..=36)
        // shares its discriminants with the valid QOI range, so the QOI
        // byte doubles as the reply COT directly.
        for group in self.batch_points(station, &matching, qoi)? {
            self.send_to_session(session_id, group).await;
        }

        self.send_term(session_id, asdu).await;
        Ok(())
    }

    /// Groups points by `TypeId` (stable, ascending-IOA order preserved)
    /// and packs each group into as few ASDUs as `max_asdu_size` allows.
    fn batch_points(&self, station: &Arc<Station>, points: &[Arc<DataPoint>], cot_value: u8) -> Result<Vec<Asdu>> {
        let cot = Cot::from_u8(cot_value).unwrap_or(Cot::InterrogatedByStation);
        let mut by_type: Vec<(TypeId, Vec<Arc<DataPoint>>)> = Vec::new();
        for point in points {
            match by_type.iter_mut().find(|(t, _)| *t == point.type_id()) {
                Some((_, v)) => v.push(point.clone()),
                None => by_type.push((point.type_id(), vec![point.clone()])),
            }
        }

        let mut asdus = Vec::new();
        for (type_id, points) in by_type {
            let mut current = Asdu::new(AsduHeader::new(type_id, 0, cot, station.common_address()));
            for point in points {
                let info = point.information();
                let obj = encode_information_object(point.ioa(), type_id, &info)?;
                let added_len = 3 + obj.data.len();
                if current.header.vsq.count > 0
                    && current.encoded_len() + added_len > self.config.max_asdu_size
                {
                    asdus.push(current);
                    current = Asdu::new(AsduHeader::new(type_id, 0, cot, station.common_address()));
                }
                current.objects.push(obj);
                current.header.vsq = crate::types::Vsq::new(current.header.vsq.count + 1, false);
            }
            if current.header.vsq.count > 0 {
                asdus.push(current);
            }
        }
        Ok(asdus)
    }

    async fn handle_counter_interrogation(&self, session_id: u64, station: &Arc<Station>, asdu: &Asdu) -> Result<()> {
        let (group, _freeze_or_reset) = decode_qcc(object_body(&asdu.raw_data)?)?;
        self.send_con(session_id, asdu, false).await;

        let qoi_equivalent = if group == 0 { 20 } else { 20 + group };
        let matching: Vec<_> = station
            .points_sorted()
            .into_iter()
            .filter(|p| p.type_id() == TypeId::IntegratedTotals && p.matches_qoi(qoi_equivalent))
            .collect();

        // Freeze/reset side effects on the running counter are out of
        // scope here; only the current latched value is reported.
        let cot_value = Cot::RequestedByGeneralCounter.as_u8() + group;
        for batch in self.batch_points(station, &matching, cot_value)? {
            self.send_to_session(session_id, batch).await;
        }
        self.send_term(session_id, asdu).await;
        Ok(())
    }

    /// C_RD_NA_1: a spontaneous COT=Request reply, not an ACT_CON/ACT_TERM
    /// pair (IEC 104 reads are not activations).
    async fn handle_read(&self, session_id: u64, station: &Arc<Station>, asdu: &Asdu) -> Result<()> {
        let ioa = Ioa::from_bytes(&asdu.raw_data)?;
        let point = station
            .get_point(ioa)
            .ok_or_else(|| crate::error::DecodeError::UnknownIoa(ioa.value()).into_error())?;

        if point.before_read() == ResponseState::Failure {
            return Err(ApplicationError::Readonly.into());
        }
        let info = point.information();
        let obj = encode_information_object(ioa, point.type_id(), &info)?;
        let mut reply = Asdu::new(AsduHeader::new(point.type_id(), 1, Cot::Request, station.common_address()));
        reply.objects.push(obj);
        self.send_to_session(session_id, reply).await;
        Ok(())
    }

    /// C_CS_NA_1: runs `on_clock_sync`, replies with ACT_CON only (per
    /// §4.8, clock sync never gets an ACT_TERM).
    async fn handle_clock_sync(
        &self,
        session_id: u64,
        peer: SocketAddr,
        station: &Arc<Station>,
        asdu: &Asdu,
    ) -> Result<()> {
        let cp56 = decode_clock_sync(object_body(&asdu.raw_data)?)?;
        let time = cp56_to_system_time(&cp56, station.tz_offset_secs(), station.dst());
        let accepted = match invoke_guarded(&self.on_clock_sync.read().unwrap(), (peer, time), ResponseState::None) {
            ResponseState::Failure => false,
            _ => true,
        };
        self.send_con(session_id, asdu, !accepted).await;
        Ok(())
    }

    /// C_TS_NA_1 / C_TS_TA_1: acknowledge-only, no application effect.
    async fn handle_test_command(&self, session_id: u64, _station: &Arc<Station>, asdu: &Asdu) -> Result<()> {
        self.send_con(session_id, asdu, false).await;
        Ok(())
    }

    /// C_RP_NA_1: acknowledge-only; this crate does not model a restartable
    /// application process to reset.
    async fn handle_reset_process(&self, session_id: u64, _station: &Arc<Station>, asdu: &Asdu) -> Result<()> {
        self.send_con(session_id, asdu, false).await;
        Ok(())
    }

    /// Single/double/setpoint command dispatch: select-and-execute points
    /// get ACT_CON-only on a select and ACT_CON+ACT_TERM on an execute;
    /// direct-mode points only ever get ACT_CON (plus optional return-info),
    /// per §4.8.1.
    async fn handle_command(&self, session_id: u64, station: &Arc<Station>, asdu: &Asdu) -> Result<()> {
        let ioa = Ioa::from_bytes(&asdu.raw_data)?;
        let point = station
            .get_point(ioa)
            .ok_or_else(|| crate::error::DecodeError::UnknownIoa(ioa.value()).into_error())?;
        if point.type_id() != asdu.header.type_id {
            return Err(crate::error::DecodeError::TypeMismatch {
                expected: point.type_id().standard_name(),
                received: asdu.header.type_id.standard_name(),
            }
            .into());
        }

        let (value, command) = decode_command_object(asdu.header.type_id, object_body(&asdu.raw_data)?)?;
        let selection = Selection {
            originator_address: asdu.header.originator,
            connection_id: session_id,
        };

        let select_and_execute = point.command_mode() == crate::config::CommandMode::SelectAndExecute;
        let outcome = if select_and_execute {
            if command.select {
                point.select(selection, Instant::now() + self.config.select_timeout)
            } else {
                point.consume_selection(selection)
            }
        } else {
            Ok(())
        };

        if select_and_execute && command.select && outcome.is_ok() {
            if let Some(s) = self.sessions.write().unwrap().get_mut(&session_id) {
                s.selections.push((station.common_address(), ioa));
            }
        }

        let mut return_info_point = None;
        let negative = match outcome {
            Ok(()) => {
                if !command.select {
                    if select_and_execute {
                        if let Some(s) = self.sessions.write().unwrap().get_mut(&session_id) {
                            s.selections.retain(|&(ca, i)| !(ca == station.common_address() && i == ioa));
                        }
                    }
                    point.apply_from_network(value.clone(), crate::types::Quality::Good, SystemTime::now())?;
                    if point.related_auto_return() {
                        if let Some(related_ioa) = point.related_ioa() {
                            if let Some(related) = station.get_point(related_ioa) {
                                related.set_value(value.clone(), crate::types::Quality::Good).ok();
                                return_info_point = Some(related);
                            }
                        }
                    }
                }
                false
            }
            Err(_) => true,
        };

        // §4.8.1 / S2 order: ACT_CON, then the related-point return-info
        // report, then ACT_TERM.
        self.send_con(session_id, asdu, negative).await;
        if let Some(related) = return_info_point {
            self.send_return_info_remote(session_id, &related).await?;
        }
        if !negative && !command.select && select_and_execute {
            self.send_term(session_id, asdu).await;
        }
        Ok(())
    }

    /// §4.8.1's related-point auto-return: a spontaneous `COT=RETURN_INFO_REMOTE`
    /// report of the related monitoring point, sent to the originating session
    /// before the command's ACT_TERM.
    async fn send_return_info_remote(&self, session_id: u64, related: &Arc<DataPoint>) -> Result<()> {
        let station = related.station().ok_or(ApplicationError::WrongRole)?;
        let info = related.information();
        let obj = encode_information_object(related.ioa(), related.type_id(), &info)?;
        let mut asdu = Asdu::new(AsduHeader::new(
            related.type_id(),
            1,
            Cot::ReturnRemoteCommand,
            station.common_address(),
        ));
        asdu.objects.push(obj);
        self.send_to_session(session_id, asdu).await;
        Ok(())
    }

    async fn send_con(&self, session_id: u64, asdu: &Asdu, negative: bool) {
        let mut header = asdu.header.clone();
        header.cot = match header.cot {
            Cot::Activation => Cot::ActivationConfirm,
            Cot::Deactivation => Cot::DeactivationConfirm,
            other => other,
        };
        header.negative = negative;
        let mut reply = Asdu::new(header);
        reply.objects = asdu.objects.clone();
        if reply.objects.is_empty() {
            reply.raw_data = asdu.raw_data.clone();
        }
        self.send_to_session(session_id, reply).await;
    }

    async fn send_term(&self, session_id: u64, asdu: &Asdu) {
        let mut header = asdu.header.clone();
        header.cot = Cot::ActivationTermination;
        let mut reply = Asdu::new(header);
        reply.raw_data = asdu.raw_data.clone();
        self.send_to_session(session_id, reply).await;
    }
}

trait IntoError {
    fn into_error(self) -> Iec104Error;
}

impl IntoError for crate::error::DecodeError {
    fn into_error(self) -> Iec104Error {
        self.into()
    }
}
