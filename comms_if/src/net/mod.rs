//! # Network Module
//!
//! This module provides the connection to the MQTT broker the rover and ground station talk
//! through.
//!
//! A [`BrokerClient`] owns one broker session. The session's network I/O runs on a background
//! thread, which keeps the connection alive, reconnects after the link drops, re-subscribes after
//! every reconnection, and pushes every received frame into an [`InboundQueue`]. The state of the
//! session is visible through [`BrokerClient::state`] or as a stream of transitions from
//! [`BrokerClient::state_changes`].

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, Sender},
        Arc, Mutex, MutexGuard,
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, info, trace, warn};
use rumqttc::{
    Client, ClientError, Connection, ConnectionError, Event, MqttOptions, NetworkOptions, Outgoing,
    Packet, QoS,
};
use serde::{Deserialize, Serialize};

use crate::{
    codec::{self, CodecError, Envelope},
    inbound::InboundQueue,
};

// Export rumqttc
pub use rumqttc;

pub use params::NetParams;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Granularity with which the retry wait checks for a shutdown request.
const SHUTDOWN_CHECK_PERIOD: Duration = Duration::from_millis(50);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something commands can be published to.
pub trait CommandSink {
    /// Publish the envelope on the given topic.
    ///
    /// Must not block. If the sink can't currently send, `NetError::NotConnected` is returned and
    /// the envelope is dropped.
    fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), NetError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A session with the MQTT broker.
pub struct BrokerClient {
    shared: Arc<Mutex<Shared>>,

    queue: InboundQueue,

    shutdown: Arc<AtomicBool>,

    join_handle: Option<thread::JoinHandle<()>>,
}

/// State shared between the client handle and the network thread.
struct Shared {
    state: ConnectionState,

    /// Every topic requested by the user, subscribed on each fresh connection.
    topics: Vec<String>,

    client: Option<Client>,

    listeners: Vec<Sender<ConnectionState>>,
}

/// Everything the network thread needs to run the session.
struct Link {
    options: MqttOptions,

    network: NetworkOptions,

    request_capacity: usize,

    retry_interval: Duration,

    shared: Arc<Mutex<Shared>>,

    queue: InboundQueue,

    shutdown: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// State of the broker session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session, or the link dropped and a reconnection is pending.
    Disconnected,

    /// Waiting for the broker to accept the connection.
    Connecting,

    /// The broker accepted the connection, publishing is possible.
    Connected,

    /// The connection attempt failed.
    Failed,
}

/// Events which drive the connection state machine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The user asked for a connection.
    ConnectRequested,

    /// The broker accepted the connection.
    AckAccepted,

    /// The broker refused the connection.
    AckRefused,

    /// The transport failed.
    NetworkError,

    /// A reconnection attempt started.
    RetryStarted,

    /// The user closed the session.
    DisconnectRequested,
}

/// How a single connection attempt ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum AttemptEnd {
    /// Shutdown was requested, or the link was closed cleanly.
    Closed,

    /// The broker refused the connection, retrying won't help.
    Refused,

    /// The transport failed, either while connecting or after being connected.
    Dropped,
}

#[derive(thiserror::Error, Debug)]
pub enum NetError {
    #[error("The client is not connected to the broker")]
    NotConnected,

    #[error("Transport error: {0}")]
    TransportError(ClientError),

    #[error("Could not encode the message: {0}")]
    CodecError(CodecError),

    #[error("Could not start the network thread: {0}")]
    ThreadSpawnError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ConnectionState {
    /// The state reached from this one after the given event.
    pub fn next(self, event: LinkEvent) -> Self {
        use ConnectionState::*;

        match (self, event) {
            (_, LinkEvent::DisconnectRequested) => Disconnected,
            (_, LinkEvent::ConnectRequested) => Connecting,
            (_, LinkEvent::AckAccepted) => Connected,
            (_, LinkEvent::AckRefused) => Failed,
            (Connecting, LinkEvent::NetworkError) => Failed,
            (Connected, LinkEvent::NetworkError) => Disconnected,
            (Disconnected, LinkEvent::RetryStarted) | (Failed, LinkEvent::RetryStarted) => {
                Connecting
            }
            (s, _) => s,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

impl BrokerClient {
    /// Create a new, disconnected, client which will push received frames into `queue`.
    pub fn new(queue: InboundQueue) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                topics: Vec::new(),
                client: None,
                listeners: Vec::new(),
            })),
            queue,
            shutdown: Arc::new(AtomicBool::new(false)),
            join_handle: None,
        }
    }

    /// Start a session with the broker described by `params`.
    ///
    /// This function does not wait for the broker, the result of the connection is signalled by
    /// the state moving to `Connected` or `Failed`. Any existing session is closed first.
    pub fn connect(&mut self, params: &NetParams) -> Result<(), NetError> {
        self.disconnect();

        let mut options = MqttOptions::new(params.client_id(), &params.host, params.port);
        options.set_keep_alive(Duration::from_secs(params.keepalive_s.max(1)));
        if !params.username.is_empty() {
            options.set_credentials(&params.username, &params.password);
        }

        let mut network = NetworkOptions::new();
        network.set_connection_timeout(params.connection_timeout_s.max(1));

        info!(
            "Connecting to broker at {}:{} as {:?}",
            params.host, params.port, params.username
        );

        self.shutdown = Arc::new(AtomicBool::new(false));
        lock(&self.shared).transition(LinkEvent::ConnectRequested);

        // Create clones for use by the network thread
        let link = Link {
            options,
            network,
            request_capacity: params.request_capacity.max(1),
            retry_interval: Duration::from_millis(params.retry_interval_ms),
            shared: self.shared.clone(),
            queue: self.queue.clone(),
            shutdown: self.shutdown.clone(),
        };

        let join_handle = thread::Builder::new()
            .name("broker_link".into())
            .spawn(move || link.run())
            .map_err(|e| {
                lock(&self.shared).transition(LinkEvent::NetworkError);
                NetError::ThreadSpawnError(e)
            })?;

        self.join_handle = Some(join_handle);

        Ok(())
    }

    /// Subscribe to a topic.
    ///
    /// The topic is remembered and subscribed to on every fresh connection. If the client is
    /// currently connected the subscription is also sent immediately.
    pub fn subscribe(&self, topic: &str) -> Result<(), NetError> {
        let mut shared = lock(&self.shared);

        if !shared.topics.iter().any(|t| t == topic) {
            shared.topics.push(topic.to_string());
        }

        if shared.state == ConnectionState::Connected {
            if let Some(ref client) = shared.client {
                client
                    .try_subscribe(topic, QoS::AtMostOnce)
                    .map_err(NetError::TransportError)?;
                debug!("Subscribed to {}", topic);
            }
        } else {
            debug!("Subscription to {} deferred until connected", topic);
        }

        Ok(())
    }

    /// Close the session.
    ///
    /// Stops the network thread and waits for it to exit. Calling this on a client which isn't
    /// connected does nothing except ensure the state is `Disconnected`.
    pub fn disconnect(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(ref client) = lock(&self.shared).client {
            // The link may already be down, in which case there's nothing to tell the broker
            client.try_disconnect().ok();
        }

        if let Some(jh) = self.join_handle.take() {
            debug!("Waiting for the network thread to exit");
            if jh.join().is_err() {
                warn!("Network thread panicked");
            }
        }

        let mut shared = lock(&self.shared);
        shared.client = None;
        shared.transition(LinkEvent::DisconnectRequested);
    }

    /// Current state of the session.
    pub fn state(&self) -> ConnectionState {
        lock(&self.shared).state
    }

    /// Return if the client is connected or not.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Get a receiver which will be sent every future state transition.
    pub fn state_changes(&self) -> Receiver<ConnectionState> {
        let (tx, rx) = channel();
        lock(&self.shared).listeners.push(tx);
        rx
    }

    /// Topics this client subscribes to.
    pub fn topics(&self) -> Vec<String> {
        lock(&self.shared).topics.clone()
    }

    /// The queue received frames are pushed into.
    pub fn queue(&self) -> &InboundQueue {
        &self.queue
    }
}

impl CommandSink for BrokerClient {
    /// Encode and publish an envelope.
    ///
    /// Fails with `NotConnected` without touching the network if the client isn't connected.
    /// Nothing is buffered, a command which can't be sent now is lost.
    fn publish(&self, topic: &str, envelope: &Envelope) -> Result<(), NetError> {
        let shared = lock(&self.shared);

        if shared.state != ConnectionState::Connected {
            return Err(NetError::NotConnected);
        }

        let client = match shared.client {
            Some(ref c) => c,
            None => return Err(NetError::NotConnected),
        };

        let bytes = codec::encode(envelope).map_err(NetError::CodecError)?;

        client
            .try_publish(topic, QoS::AtMostOnce, false, bytes)
            .map_err(NetError::TransportError)?;

        trace!("Published {} to {}", envelope.event_type, topic);

        Ok(())
    }
}

impl Drop for BrokerClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Link {
    /// Network thread body: runs connection attempts until shutdown is requested or the broker
    /// refuses us.
    ///
    /// Every attempt gets a fresh rumqttc client and event loop, so nothing requested during a
    /// previous connection is replayed on the next one.
    fn run(self) {
        loop {
            let (client, mut connection) = Client::new(self.options.clone(), self.request_capacity);
            connection.eventloop.set_network_options(self.network.clone());

            {
                let mut shared = lock(&self.shared);

                // Checked under the lock so a concurrent disconnect either sees this client or
                // this thread sees the shutdown
                if self.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                shared.client = Some(client);
            }

            match self.attempt(&mut connection) {
                AttemptEnd::Closed | AttemptEnd::Refused => break,
                AttemptEnd::Dropped => {
                    // Drops anything still queued for the dead connection
                    drop(connection);

                    if !wait_for_retry(&self.shutdown, self.retry_interval) {
                        break;
                    }
                    lock(&self.shared).transition(LinkEvent::RetryStarted);
                }
            }
        }

        debug!("Network thread exiting");
    }

    /// Poll one connection until it ends.
    ///
    /// Polls are never cancelled part way through. A connection attempt is bounded by the
    /// connection timeout, and once connected `disconnect` wakes the poll by queueing a
    /// DISCONNECT.
    fn attempt(&self, connection: &mut Connection) -> AttemptEnd {
        for event in connection.iter() {
            if self.shutdown.load(Ordering::Relaxed) {
                return AttemptEnd::Closed;
            }

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    debug!("ConnAck: {:?}", ack);
                    lock(&self.shared).on_connected();
                }
                Ok(Event::Incoming(Packet::Publish(p))) => {
                    if self.queue.push_frame(&p.topic, &p.payload) {
                        trace!("Inbound queue full, oldest entry dropped");
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    debug!("Subscription confirmed (pkid={})", ack.pkid)
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => return AttemptEnd::Closed,
                Ok(_) => (),
                Err(ConnectionError::ConnectionRefused(code)) => {
                    warn!("Broker refused the connection: {:?}", code);
                    lock(&self.shared).transition(LinkEvent::AckRefused);
                    return AttemptEnd::Refused;
                }
                Err(e) => {
                    warn!("Broker link error: {}", e);
                    let mut shared = lock(&self.shared);
                    shared.client = None;
                    shared.transition(LinkEvent::NetworkError);
                    return AttemptEnd::Dropped;
                }
            }
        }

        // The request channel closed
        AttemptEnd::Closed
    }
}

impl Shared {
    /// Apply an event to the state, logging and notifying listeners if it changed.
    fn transition(&mut self, event: LinkEvent) {
        let old = self.state;
        let new = old.next(event);

        if new == old {
            return;
        }

        match new {
            ConnectionState::Failed | ConnectionState::Disconnected => {
                warn!("Broker connection {} -> {} ({:?})", old, new, event)
            }
            _ => info!("Broker connection {} -> {} ({:?})", old, new, event),
        }

        self.state = new;

        // Drop listeners which have hung up
        self.listeners.retain(|l| l.send(new).is_ok());
    }

    /// Handle the broker accepting the connection.
    fn on_connected(&mut self) {
        self.transition(LinkEvent::AckAccepted);

        if let Some(ref client) = self.client {
            for topic in self.topics.iter() {
                match client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                    Ok(_) => debug!("Subscribed to {}", topic),
                    Err(e) => warn!("Could not subscribe to {}: {}", topic, e),
                }
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn lock(shared: &Arc<Mutex<Shared>>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// Sleep for the retry interval, returning `false` early if shutdown is requested.
fn wait_for_retry(shutdown: &AtomicBool, retry_interval: Duration) -> bool {
    let start = Instant::now();

    while start.elapsed() < retry_interval {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        thread::sleep(SHUTDOWN_CHECK_PERIOD.min(retry_interval));
    }

    !shutdown.load(Ordering::Relaxed)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::tc::ChassisCommand;
    use std::{
        io::{Read, Write},
        net::{TcpListener, TcpStream},
        sync::mpsc,
    };

    const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    /// Read one MQTT packet, returning the fixed header's first byte followed by the body.
    fn read_packet(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte)?;
        let header = byte[0];

        // Remaining length is a base 128 varint
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            stream.read_exact(&mut byte)?;
            len |= ((byte[0] & 0x7f) as usize) << shift;
            if byte[0] & 0x80 == 0 {
                break;
            }
            shift += 7;
        }

        let mut packet = vec![0u8; len + 1];
        packet[0] = header;
        stream.read_exact(&mut packet[1..])?;
        Ok(packet)
    }

    /// Accept a connection and answer its CONNECT with an accepting CONNACK.
    fn accept_session(listener: &TcpListener) -> std::io::Result<TcpStream> {
        let (mut stream, _) = listener.accept()?;
        stream.set_read_timeout(Some(Duration::from_secs(10)))?;

        let connect = read_packet(&mut stream)?;
        assert_eq!(connect[0] >> 4, 1, "expected CONNECT, got {:02x?}", connect);

        stream.write_all(&CONNACK_ACCEPTED)?;
        Ok(stream)
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_state_machine() {
        use ConnectionState::*;

        assert_eq!(Disconnected.next(LinkEvent::ConnectRequested), Connecting);
        assert_eq!(Connecting.next(LinkEvent::AckAccepted), Connected);
        assert_eq!(Connecting.next(LinkEvent::AckRefused), Failed);
        assert_eq!(Connecting.next(LinkEvent::NetworkError), Failed);
        assert_eq!(Connected.next(LinkEvent::NetworkError), Disconnected);
        assert_eq!(Disconnected.next(LinkEvent::RetryStarted), Connecting);
        assert_eq!(Failed.next(LinkEvent::RetryStarted), Connecting);

        // A retry doesn't interrupt a live connection
        assert_eq!(Connected.next(LinkEvent::RetryStarted), Connected);

        for s in [Disconnected, Connecting, Connected, Failed].iter() {
            assert_eq!(s.next(LinkEvent::DisconnectRequested), Disconnected);
        }
    }

    #[test]
    fn test_publish_not_connected() {
        let client = BrokerClient::new(InboundQueue::default());
        assert_eq!(client.state(), ConnectionState::Disconnected);

        match client.publish(
            crate::tc::CHASSIS_INBOUND_TOPIC,
            &ChassisCommand::default().to_envelope(),
        ) {
            Err(NetError::NotConnected) => (),
            r => panic!("Expected NotConnected, got {:?}", r),
        }
    }

    #[test]
    fn test_subscribe_deferred() {
        let client = BrokerClient::new(InboundQueue::default());

        client.subscribe("a").unwrap();
        client.subscribe("b").unwrap();
        client.subscribe("a").unwrap();

        assert_eq!(client.topics(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_disconnect_idempotent() {
        let mut client = BrokerClient::new(InboundQueue::default());
        let changes = client.state_changes();

        client.disconnect();
        client.disconnect();

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_unreachable_broker_fails() {
        let mut client = BrokerClient::new(InboundQueue::default());
        let changes = client.state_changes();

        // Nothing listens on the discard port
        let params = NetParams {
            host: "127.0.0.1".into(),
            port: 9,
            retry_interval_ms: 100,
            ..Default::default()
        };

        client.connect(&params).unwrap();

        assert_eq!(
            changes.recv_timeout(Duration::from_secs(5)),
            Ok(ConnectionState::Connecting)
        );
        assert_eq!(
            changes.recv_timeout(Duration::from_secs(10)),
            Ok(ConnectionState::Failed)
        );

        // Publishing never reaches the network while not connected
        match client.publish("t", &ChassisCommand::default().to_envelope()) {
            Err(NetError::NotConnected) => (),
            r => panic!("Expected NotConnected, got {:?}", r),
        }

        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_silent_broker_fails() {
        // Accepts connections but never answers them
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming() {
                match stream {
                    Ok(s) => held.push(s),
                    Err(_) => break,
                }
            }
        });

        let mut client = BrokerClient::new(InboundQueue::default());
        let changes = client.state_changes();

        let params = NetParams {
            host: "127.0.0.1".into(),
            port,
            connection_timeout_s: 1,
            retry_interval_ms: 5000,
            ..Default::default()
        };

        client.connect(&params).unwrap();

        assert_eq!(
            changes.recv_timeout(Duration::from_secs(5)),
            Ok(ConnectionState::Connecting)
        );
        assert_eq!(
            changes.recv_timeout(Duration::from_secs(10)),
            Ok(ConnectionState::Failed)
        );

        // Disconnecting interrupts the retry wait
        let start = Instant::now();
        client.disconnect();
        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_reconnect_resubscribes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (packet_tx, packets) = mpsc::channel::<Vec<u8>>();

        // Broker which drops the first session after one PUBLISH and keeps the second
        let broker = thread::spawn(move || -> std::io::Result<()> {
            let mut first = accept_session(&listener)?;
            packet_tx.send(read_packet(&mut first)?).ok();
            packet_tx.send(read_packet(&mut first)?).ok();
            drop(first);

            let mut second = accept_session(&listener)?;
            packet_tx.send(read_packet(&mut second)?).ok();
            packet_tx.send(read_packet(&mut second)?).ok();
            Ok(())
        });

        let mut client = BrokerClient::new(InboundQueue::default());
        let changes = client.state_changes();
        client.subscribe("orion/science/out").unwrap();

        let params = NetParams {
            host: "127.0.0.1".into(),
            port,
            retry_interval_ms: 100,
            ..Default::default()
        };

        client.connect(&params).unwrap();

        let next_state = || changes.recv_timeout(Duration::from_secs(10));
        let next_packet = || packets.recv_timeout(Duration::from_secs(10)).unwrap();

        assert_eq!(next_state(), Ok(ConnectionState::Connecting));
        assert_eq!(next_state(), Ok(ConnectionState::Connected));

        let subscribe = next_packet();
        assert_eq!(subscribe[0], 0x82);
        assert!(contains(&subscribe, b"orion/science/out"));

        client
            .publish("orion/chassis/in", &ChassisCommand::default().to_envelope())
            .unwrap();
        let publish = next_packet();
        assert_eq!(publish[0], 0x30);
        assert!(contains(&publish, b"orion/chassis/in"));

        // The broker drops the link, the client reconnects
        assert_eq!(next_state(), Ok(ConnectionState::Disconnected));

        // Commands issued while the link is down are refused rather than queued
        match client.publish("orion/chassis/in", &ChassisCommand::default().to_envelope()) {
            Err(NetError::NotConnected) => (),
            r => panic!("Expected NotConnected, got {:?}", r),
        }

        assert_eq!(next_state(), Ok(ConnectionState::Connecting));
        assert_eq!(next_state(), Ok(ConnectionState::Connected));

        // First thing on the new session is the subscription, no stale publish replayed
        let subscribe = next_packet();
        assert_eq!(subscribe[0], 0x82);
        assert!(contains(&subscribe, b"orion/science/out"));

        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);

        // Then a clean DISCONNECT
        assert_eq!(next_packet()[0], 0xe0);
        broker.join().unwrap().unwrap();
    }
}
