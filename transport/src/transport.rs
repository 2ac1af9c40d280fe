//! The public `Transport` singleton and its shared state (spec.md §3,
//! "Transport" entity; §4.1, operations; §5, concurrency).
//!
//! Grounded on the teacher's `Endpoint` + driver-task split in
//! `sctp-proto`/`sctp::endpoint`: a cheap `Arc`-backed handle in front of one
//! lock-guarded shared struct, with background tasks (there, per-association
//! driver futures; here, the maintenance loop, the manage-cycle loop, and the
//! dispatcher) pumping the protocol engine and translating its events.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;
use fxhash::FxHashMap;
use log::{debug, info, trace, warn};
use tokio::sync::{mpsc, oneshot, Notify};

use ardp::{ArdpHandle, ConnEvent, ConnectionHandle, DatagramEvent};

use crate::config::Config;
use crate::endpoint::{Direction, Endpoint, EndpointFeatures, EndpointHandle, EndpointState, EndpointTable, NameTransferMode, Table};
use crate::error::{Result, TransportError};
use crate::net;
use crate::router::{NameService, Router};
use crate::spec::TransportSpec;
use crate::stream::{push_bytes, Stream};
use crate::udp::UdpSocket;
use crate::workqueue::{self, enqueue, WorkItem, WorkSender};

/// One datagram read off a listen socket, tagged with which socket it came
/// from so a reply goes out the same interface it arrived on.
struct RawDatagram {
    socket: usize,
    remote: SocketAddr,
    data: Bytes,
}

/// State shared by every clone of a [`Transport`] handle and by the
/// maintenance/manage/dispatcher tasks (spec.md §5, lock order: endpoint
/// list, then ARDP, then callback/router, then per-stream state).
pub(crate) struct Shared {
    pub(crate) endpoints: Mutex<EndpointTable>,
    pub(crate) ardp: Mutex<ArdpHandle>,
    pub(crate) config: Config,
    pub(crate) router: Arc<dyn Router>,
    name_service: Option<Arc<dyn NameService>>,

    sockets: Mutex<Vec<Arc<UdpSocket>>>,
    connect_waiters: Mutex<FxHashMap<ConnectionHandle, oneshot::Sender<Result<EndpointHandle>>>>,

    stopping: AtomicBool,

    raw_tx: mpsc::UnboundedSender<RawDatagram>,
    /// Wakes the maintenance loop on a new send or a shutdown request,
    /// outside of any datagram arriving.
    maintenance_notify: Notify,
    pub(crate) manage_notify: Notify,

    dispatcher: WorkSender,
}

impl Shared {
    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub(crate) fn dispatcher(&self) -> &WorkSender {
        &self.dispatcher
    }

    pub(crate) fn nudge_maintenance(&self) {
        self.maintenance_notify.notify_one();
    }

    pub(crate) fn take_connect_waiter(
        &self,
        conn: Option<ConnectionHandle>,
    ) -> Option<oneshot::Sender<Result<EndpointHandle>>> {
        let conn = conn?;
        self.connect_waiters.lock().unwrap().remove(&conn)
    }

    fn listen_addresses(&self) -> Vec<SocketAddr> {
        self.sockets
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| s.local_addr().ok())
            .collect()
    }
}

/// Public entry point (spec.md §4.1, "Transport" operations). Cheap to
/// clone; every clone shares the same [`Shared`] state.
#[derive(Clone)]
pub struct Transport {
    shared: Arc<Shared>,
    tasks: Arc<Tasks>,
}

struct Tasks {
    dispatcher: tokio::task::JoinHandle<()>,
    manage: tokio::task::JoinHandle<()>,
    maintenance: tokio::task::JoinHandle<()>,
}

impl Transport {
    /// `start` (spec.md §4.1): brings up the dispatcher, manage-cycle, and
    /// maintenance tasks. No sockets are bound yet; that is `start_listen`'s
    /// job.
    pub fn start(
        config: Config,
        router: Arc<dyn Router>,
        name_service: Option<Arc<dyn NameService>>,
    ) -> Self {
        let (dispatcher_tx, dispatcher_rx) = workqueue::channel();
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            endpoints: Mutex::new(EndpointTable::new()),
            ardp: Mutex::new(ArdpHandle::new(config.ardp.clone())),
            config,
            router,
            name_service,
            sockets: Mutex::new(Vec::new()),
            connect_waiters: Mutex::new(FxHashMap::default()),
            stopping: AtomicBool::new(false),
            raw_tx,
            maintenance_notify: Notify::new(),
            manage_notify: Notify::new(),
            dispatcher: dispatcher_tx,
        });

        let dispatcher = workqueue::spawn_dispatcher(shared.clone(), dispatcher_rx);
        let manage = crate::endpoint_manager::spawn_manage_loop(shared.clone());
        let maintenance = spawn_maintenance_loop(shared.clone(), raw_rx);

        info!("transport: started");
        Transport {
            shared,
            tasks: Arc::new(Tasks { dispatcher, manage, maintenance }),
        }
    }

    /// `start_listen` (spec.md §4.1, §6 "Transport spec grammar"): binds a
    /// new UDP socket and spawns its reader task.
    pub async fn start_listen(&self, spec: &str) -> Result<SocketAddr> {
        if self.shared.is_stopping() {
            return Err(TransportError::Stopping);
        }
        let parsed = TransportSpec::parse(spec)?;
        let bind_addr = SocketAddr::from((parsed.addr, parsed.port));

        {
            let sockets = self.shared.sockets.lock().unwrap();
            for s in sockets.iter() {
                if s.local_addr().ok() == Some(bind_addr) {
                    return Err(TransportError::AlreadyListeningSpec);
                }
            }
        }

        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let local = socket.local_addr()?;
        let index = {
            let mut sockets = self.shared.sockets.lock().unwrap();
            sockets.push(socket.clone());
            sockets.len() - 1
        };

        spawn_reader(index, socket, self.shared.raw_tx.clone());
        info!("transport: listening on {local}");
        Ok(local)
    }

    /// `connect` (spec.md §4.1): active open, admitted once the handshake
    /// completes or times out.
    pub async fn connect(&self, spec: &str, hello: Bytes) -> Result<EndpointHandle> {
        if self.shared.is_stopping() {
            return Err(TransportError::Stopping);
        }
        let parsed = TransportSpec::parse(spec)?;
        let remote = SocketAddr::from((parsed.addr, parsed.port));

        let listening = self.shared.listen_addresses();
        if net::is_self_connect(remote, &listening) {
            return Err(TransportError::AlreadyListening);
        }
        if !net::has_route_to(remote) {
            return Err(TransportError::NoNetwork);
        }

        let (tx, rx) = oneshot::channel();
        let conn = {
            let mut ardp = self.shared.ardp.lock().unwrap();
            let conn = ardp.connect(Instant::now(), remote, hello);
            self.shared.connect_waiters.lock().unwrap().insert(conn, tx);
            conn
        };
        self.shared.nudge_maintenance();

        let deadline = self.shared.config.connect_deadline();
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Stopping),
            Err(_) => {
                self.shared.connect_waiters.lock().unwrap().remove(&conn);
                Err(TransportError::Timeout)
            }
        }
    }

    /// Producer-facing write (spec.md §4.4.1, `push_bytes`).
    pub async fn push_bytes(&self, endpoint: EndpointHandle, data: Bytes) -> Result<usize> {
        push_bytes(&self.shared, endpoint, data).await
    }

    /// Requests a graceful local disconnect (spec.md §4.4.2, the
    /// `(false, false, false)` row).
    pub fn disconnect(&self, endpoint: EndpointHandle) {
        let mut endpoints = self.shared.endpoints.lock().unwrap();
        if let Some(ep) = endpoints.get_mut(endpoint) {
            let ardp_conn = ep.ardp_conn;
            let ardp = &self.shared.ardp;
            crate::stream::disconnect(&mut ep.stream, false, None, || {
                if let Some(conn) = ardp_conn {
                    let mut ardp = ardp.lock().unwrap();
                    if let Some(c) = ardp.connection_mut(conn) {
                        c.disconnect(Instant::now());
                    }
                }
                Ok(())
            });
        }
        drop(endpoints);
        self.shared.nudge_maintenance();
    }

    pub fn get_listen_addresses(&self) -> Vec<SocketAddr> {
        self.shared.listen_addresses()
    }

    pub fn enable_advertisement(&self, name: &str) {
        if let Some(ns) = &self.shared.name_service {
            ns.advertise(name);
        }
    }

    pub fn disable_advertisement(&self, name: &str) {
        if let Some(ns) = &self.shared.name_service {
            ns.cancel_advertise(name);
        }
    }

    pub fn enable_discovery(&self, prefix: &str) {
        if let Some(ns) = &self.shared.name_service {
            ns.find(prefix);
        }
    }

    pub fn disable_discovery(&self, prefix: &str) {
        if let Some(ns) = &self.shared.name_service {
            ns.cancel_find(prefix);
        }
    }

    /// `stop` (spec.md §4.1): stops admitting new work and asks every active
    /// endpoint to wind down; does not block (use `join` for that).
    pub fn stop(&self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        let handles: Vec<EndpointHandle> = {
            let endpoints = self.shared.endpoints.lock().unwrap();
            endpoints.iter().map(|(h, _)| h).collect()
        };
        for handle in handles {
            self.disconnect(handle);
        }
        if let Some(ns) = &self.shared.name_service {
            ns.disable();
        }
        crate::endpoint_manager::request_manage_cycle(&self.shared);
        self.shared.nudge_maintenance();
    }

    /// `join` (spec.md §4.1): waits for every background task to exit.
    /// `stop` must have been called first, or this waits forever.
    pub async fn join(self) {
        enqueue(self.shared.dispatcher(), WorkItem::Shutdown);
        self.shared.nudge_maintenance();

        let tasks = match Arc::try_unwrap(self.tasks) {
            Ok(tasks) => tasks,
            Err(_) => {
                debug!("transport: join() called with other Transport clones still live");
                return;
            }
        };
        let _ = tasks.dispatcher.await;
        tasks.manage.abort();
        tasks.maintenance.abort();
        info!("transport: joined");
    }
}

fn spawn_reader(
    index: usize,
    socket: Arc<UdpSocket>,
    raw_tx: mpsc::UnboundedSender<RawDatagram>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = bytes::BytesMut::new();
        loop {
            match socket.recv(&mut buf).await {
                Ok((remote, data)) => {
                    if raw_tx.send(RawDatagram { socket: index, remote, data }).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("transport: recv error on listen socket {index}: {e}");
                    return;
                }
            }
        }
    })
}

/// The maintenance loop (spec.md §4.1, "maintenance loop"): drains inbound
/// datagrams, admits new SYNs, translates ARDP events into workqueue
/// entries, and flushes transmits and timers.
fn spawn_maintenance_loop(
    shared: Arc<Shared>,
    mut raw_rx: mpsc::UnboundedReceiver<RawDatagram>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut next_deadline = Instant::now();
        loop {
            let sleep = tokio::time::sleep_until(next_deadline.into());
            tokio::select! {
                datagram = raw_rx.recv() => {
                    match datagram {
                        Some(d) => handle_inbound(&shared, d).await,
                        None => return,
                    }
                }
                _ = shared.maintenance_notify.notified() => {}
                _ = sleep => {}
            }

            next_deadline = pump_ardp(&shared).await;

            if shared.is_stopping()
                && shared.ardp.lock().unwrap().connection_count() == 0
                && shared.endpoints.lock().unwrap().iter().count() == 0
            {
                trace!("maintenance: drained and stopping, exiting");
                return;
            }
        }
    })
}

async fn handle_inbound(shared: &Arc<Shared>, datagram: RawDatagram) {
    trace!(
        "maintenance: {} bytes from {} on listen socket {}",
        datagram.data.len(),
        datagram.remote,
        datagram.socket
    );
    let now = Instant::now();
    let event = {
        let mut ardp = shared.ardp.lock().unwrap();
        ardp.handle_datagram(now, datagram.remote, datagram.data)
    };
    match event {
        Ok(Some(DatagramEvent::NewConnection(incoming))) => {
            admit_or_reject(shared, incoming).await;
        }
        Ok(Some(DatagramEvent::Connection(_))) => {}
        Ok(None) => {}
        Err(e) => debug!("maintenance: dropping malformed datagram from {}: {e}", datagram.remote),
    }
}

async fn admit_or_reject(shared: &Arc<Shared>, incoming: ardp::Incoming) {
    let (incomplete, completed) = {
        let endpoints = shared.endpoints.lock().unwrap();
        (
            endpoints.count_table(Table::Pre) + endpoints.count_table(Table::Auth),
            endpoints.count_table(Table::Active),
        )
    };
    let over_budget = shared.is_stopping()
        || incomplete >= shared.config.max_incomplete_connections
        || incomplete + completed >= shared.config.max_completed_connections;

    if over_budget {
        debug!("maintenance: rejecting inbound SYN from {}, admission control full", incoming.remote());
        let mut ardp = shared.ardp.lock().unwrap();
        ardp.reject(incoming);
        return;
    }

    let remote = incoming.remote();
    let (features, unique_name) = crate::endpoint_manager::parse_hello_reply(&incoming.hello);
    let now = Instant::now();
    let conn = {
        let mut ardp = shared.ardp.lock().unwrap();
        ardp.accept(now, incoming, Bytes::new())
    };

    shared.endpoints.lock().unwrap().insert(|handle| Endpoint {
        handle,
        ardp_conn: Some(conn),
        direction: Direction::Passive,
        remote,
        remote_guid: None,
        features,
        protocol_version: 1,
        name_transfer_mode: NameTransferMode::Simple,
        unique_name,
        start_time: now,
        stop_time: None,
        refcount: 0,
        state: EndpointState::Initialized,
        table: Table::Pre,
        exited: false,
        stream: Stream::new(shared.config.ardp.data_timeout, shared.config.ardp.data_retries),
    });
    crate::endpoint_manager::request_manage_cycle(shared);
}

/// Drains every connection's pending events, translates them into workqueue
/// entries (spec.md §4.1 maintenance loop step 3), flushes outgoing
/// transmits, and advances timers. Returns the next deadline to sleep until.
async fn pump_ardp(shared: &Arc<Shared>) -> Instant {
    let events = {
        let mut ardp = shared.ardp.lock().unwrap();
        ardp.poll_events()
    };
    for (conn, event) in events {
        translate_event(shared, conn, event);
    }

    flush_transmits(shared).await;

    let now = Instant::now();
    let next = {
        let mut ardp = shared.ardp.lock().unwrap();
        ardp.handle_timeout(now)
    };
    flush_transmits(shared).await;

    next.unwrap_or_else(|| now + shared.config.manage_cycle_interval)
}

fn translate_event(shared: &Arc<Shared>, conn: ConnectionHandle, event: ConnEvent) {
    match event {
        ConnEvent::Connected { passive, peer_hello } => {
            enqueue(shared.dispatcher(), WorkItem::ConnectCb { conn, passive, hello: Some(peer_hello) });
        }
        ConnEvent::ConnectFailed { passive } => {
            enqueue(shared.dispatcher(), WorkItem::ConnectCb { conn, passive, hello: None });
        }
        ConnEvent::Recv { data } => {
            enqueue(shared.dispatcher(), WorkItem::RecvCb { conn, data });
        }
        ConnEvent::Sent { message_id } => {
            enqueue(shared.dispatcher(), WorkItem::SendCb { conn, message_id });
        }
        ConnEvent::SendWindowChanged { .. } => {
            // No workqueue entry kind for this (spec.md §3): no router
            // interaction is needed, only waking local `push_bytes` callers.
            crate::endpoint_manager::on_send_window_changed(shared, conn);
        }
        ConnEvent::Disconnected { status } => {
            enqueue(shared.dispatcher(), WorkItem::DisconnectCb { conn, status });
        }
    }
}

/// ARDP does not track which listen socket a connection arrived on, so
/// every reply goes out the first bound socket. Fine for the common
/// single-listener case; a deployment binding more than one `udp:` spec at
/// once would need that association tracked per connection, which this core
/// does not yet do.
async fn flush_transmits(shared: &Arc<Shared>) {
    loop {
        let transmit = {
            let mut ardp = shared.ardp.lock().unwrap();
            ardp.poll_transmit()
        };
        let Some(transmit) = transmit else { break };
        let socket = {
            let sockets = shared.sockets.lock().unwrap();
            sockets.first().cloned()
        };
        if let Some(socket) = socket {
            if let Err(e) = socket.send(&transmit).await {
                warn!("maintenance: send to {} failed: {e}", transmit.remote);
            }
        }
    }
}
