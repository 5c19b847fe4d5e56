//! Node assembly and dispatch

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use orrery_core::{
    DeviceId, NodeId, OrreryError, OrreryResult, Region, Scale, Space, Time, Unit,
};
use orrery_stack::{
    Buffer, Clock, LinkTransport, Locator, Manager, Outgoing, OutgoingSender, Pipeline,
    Positioner, Router, Scheduler, Security, Stage, TaskHandle, Timekeeper, KEY_MANAGER_PERIOD,
    SINK,
};
use orrery_transport::{TokioScheduler, UdpNic, NOMINAL_RSSI};
use orrery_wire::{Message, MTU};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Role of a node in the network
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// The data and time reference at the coordinate origin
    Sink,
    /// A sensing/actuating node that localizes and synchronizes itself
    Sensor,
}

/// Everything needed to bring a node up
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub kind: NodeKind,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    /// Hardware UUID the node identity derives from
    pub uuid: [u8; 8],
    pub device: DeviceId,
    pub scale: Scale,
    /// Surveyed position and its confidence; sensors without one localize
    /// via HeCoPS
    pub position: Option<(Space, u8)>,
    /// Bound on how long a sensor may wait for time synchronization
    pub startup_timeout: Duration,
    /// Key-manager housekeeping interval
    pub key_manager_period: Duration,
}

impl NodeConfig {
    pub fn sink(local_addr: SocketAddr, remote_addr: SocketAddr, uuid: [u8; 8]) -> Self {
        NodeConfig {
            kind: NodeKind::Sink,
            local_addr,
            remote_addr,
            uuid,
            device: DeviceId::UNIQUE,
            scale: Scale::CmU32,
            position: Some((SINK, 100)),
            startup_timeout: Duration::from_secs(30),
            key_manager_period: Duration::from_micros(KEY_MANAGER_PERIOD.as_micros() as u64),
        }
    }

    pub fn sensor(local_addr: SocketAddr, remote_addr: SocketAddr, uuid: [u8; 8]) -> Self {
        NodeConfig {
            kind: NodeKind::Sensor,
            local_addr,
            remote_addr,
            uuid,
            device: DeviceId::UNIQUE,
            scale: Scale::CmU32,
            position: None,
            startup_timeout: Duration::from_secs(30),
            key_manager_period: Duration::from_micros(KEY_MANAGER_PERIOD.as_micros() as u64),
        }
    }
}

type Clients = Arc<Mutex<HashMap<Unit, Vec<mpsc::UnboundedSender<Message>>>>>;

/// A running protocol node
pub struct Node {
    id: NodeId,
    clock: Arc<Clock>,
    positioner: Arc<Positioner>,
    security: Arc<Security>,
    transport: Arc<UdpNic>,
    outgoing: OutgoingSender,
    clients: Clients,
    tasks: Vec<JoinHandle<()>>,
    periodic: Vec<Box<dyn TaskHandle>>,
}

impl Node {
    /// Bring the node up. Sensors block here until time-synchronized or the
    /// startup timeout elapses.
    pub async fn start(config: NodeConfig) -> OrreryResult<Node> {
        let is_sink = config.kind == NodeKind::Sink;
        let id = NodeId::from_uuid(config.uuid);
        info!(?id, kind = ?config.kind, "starting node");

        let (transport, frames) = UdpNic::bind(config.local_addr, config.remote_addr)?;
        let link: Arc<dyn LinkTransport> = transport.clone();
        let clock = Arc::new(Clock::new(link.clone(), is_sink));

        let positioner = Arc::new(match config.position {
            Some((here, confidence)) => Positioner::with_position(here, confidence),
            None => Positioner::unlocated(),
        });

        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let security = Arc::new(Security::new(
            id,
            is_sink,
            clock.clone(),
            out_tx.clone(),
            config.scale,
            config.device,
        ));
        if !is_sink {
            // the handshake is expected from the sink's direction
            security.add_peer(id, Region::new(SINK, 0, Time::ZERO, Time::INFINITE));
        }

        let timekeeper = Arc::new(Timekeeper::new(
            clock.clone(),
            positioner.clone(),
            out_tx.clone(),
            transport.configuration(),
            is_sink,
            config.scale,
            config.device,
        ));
        let locator = Arc::new(Locator::new(
            positioner.clone(),
            clock.clone(),
            timekeeper.clone(),
        ));
        let router = Arc::new(Router::new(
            positioner.clone(),
            clock.clone(),
            out_tx.clone(),
        ));
        let manager = Arc::new(Manager::new());

        let pipeline = Arc::new(Pipeline::new(
            security.clone() as Arc<dyn Stage>,
            locator,
            timekeeper.clone(),
            router,
            manager,
            positioner.clone(),
            clock.clone(),
        ));

        let clients: Clients = Arc::new(Mutex::new(HashMap::new()));

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(Node::dispatch(
            frames,
            pipeline.clone(),
            clients.clone(),
        )));
        tasks.push(tokio::spawn(Node::transmit(
            out_rx,
            pipeline,
            transport.clone(),
        )));

        let scheduler = TokioScheduler::new();
        let mut periodic: Vec<Box<dyn TaskHandle>> = Vec::new();
        periodic.push(scheduler.repeat(config.key_manager_period, {
            let security = security.clone();
            Box::new(move || security.key_manager_tick())
        }));

        if !is_sink {
            // announce ourselves and keep doing so while unsynchronized
            timekeeper.keep_alive();
            let sync_period = timekeeper.sync_period();
            if !sync_period.is_infinite() {
                let clock = clock.clone();
                let timekeeper = timekeeper.clone();
                periodic.push(scheduler.repeat(
                    Duration::from_micros(sync_period.as_micros() as u64),
                    Box::new(move || {
                        if !clock.synchronized() {
                            timekeeper.keep_alive();
                        }
                    }),
                ));
            }
        }

        let mut node = Node {
            id,
            clock,
            positioner,
            security,
            transport,
            outgoing: out_tx,
            clients,
            tasks,
            periodic,
        };

        if !is_sink {
            let deadline = tokio::time::Instant::now() + config.startup_timeout;
            while !node.clock.synchronized() {
                if tokio::time::Instant::now() >= deadline {
                    warn!("node never synchronized, giving up");
                    node.shutdown();
                    return Err(OrreryError::StartupTimeout);
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            info!(now = node.now().as_micros(), "node synchronized");
        }

        Ok(node)
    }

    async fn dispatch(
        mut frames: mpsc::UnboundedReceiver<(Vec<u8>, Time)>,
        pipeline: Arc<Pipeline>,
        clients: Clients,
    ) {
        while let Some((bytes, stamped)) = frames.recv().await {
            let message = match Message::decode(&bytes) {
                Ok(m) => m,
                Err(e) => {
                    warn!(error = %e, "dropping undecodable frame");
                    continue;
                }
            };

            let mut buf = Buffer::incoming(message, NOMINAL_RSSI, stamped);
            pipeline.receive(&mut buf);

            if buf.destined_to_me && buf.trusted {
                let unit = buf.message.header.unit;
                let mut clients = clients.lock();
                if let Some(list) = clients.get_mut(&unit) {
                    list.retain(|tx| tx.send(buf.message.clone()).is_ok());
                    if list.is_empty() {
                        clients.remove(&unit);
                    }
                }
            } else if buf.destined_to_me {
                debug!("frame for this node was not trusted");
            }
        }
    }

    async fn transmit(
        mut out_rx: mpsc::UnboundedReceiver<Outgoing>,
        pipeline: Arc<Pipeline>,
        transport: Arc<UdpNic>,
    ) {
        while let Some(work) = out_rx.recv().await {
            let buf = match work {
                Outgoing::Marshal(mut buf) => {
                    pipeline.marshal(&mut buf);
                    buf
                }
                Outgoing::Raw(buf) => buf,
            };

            if buf.offset > Time::ZERO {
                tokio::time::sleep(Duration::from_micros(buf.offset.as_micros() as u64)).await;
            }

            let mut frame = [0u8; MTU];
            match buf.message.encode(&mut frame) {
                Ok(n) => {
                    if let Err(e) = transport.send(&frame[..n]) {
                        warn!(error = %e, "transmit failed");
                    }
                }
                Err(e) => warn!(error = %e, "frame too large, not sent"),
            }
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Current protocol time
    pub fn now(&self) -> Time {
        self.clock.now()
    }

    pub fn here(&self) -> Space {
        self.positioner.here()
    }

    pub fn synchronized(&self) -> bool {
        self.clock.synchronized()
    }

    /// Queue a locally originated message for marshal and transmission
    pub fn send(&self, message: Message) -> OrreryResult<()> {
        self.outgoing
            .send(Outgoing::Marshal(Buffer::outgoing(message)))
            .map_err(|_| OrreryError::Shutdown)
    }

    /// Subscribe to trusted frames carrying `unit` that are destined to
    /// this node
    pub fn attach(&self, unit: Unit) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.lock().entry(unit).or_default().push(tx);
        rx
    }

    /// Drop every subscription for `unit`
    pub fn detach(&self, unit: Unit) {
        self.clients.lock().remove(&unit);
    }

    /// Provision trust in a peer; the key manager handshakes it from the
    /// next tick on
    pub fn add_peer(&self, id: NodeId, valid_region: Region) {
        self.security.add_peer(id, valid_region);
    }

    pub fn trusted_peer_count(&self) -> usize {
        self.security.trusted_peer_count()
    }

    /// Stop every task and the receive thread
    pub fn shutdown(&mut self) {
        for mut handle in self.periodic.drain(..) {
            handle.cancel();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.transport.shutdown();
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.shutdown();
    }
}
