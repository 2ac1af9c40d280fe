//! End-to-end scenarios over real loopback UDP sockets (spec.md §8,
//! "Concrete end-to-end scenarios"), grounded on the teacher's
//! `association_test.rs` style of spinning up a client/server pair and
//! driving them through `tokio::test`, adapted from a bridged in-memory
//! `Conn` pair to real `127.0.0.1:0` sockets since this crate owns its own
//! UDP I/O rather than taking a pluggable connection.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use transport::{Config, EndpointFeatures, EndpointHandle, InboundMessage, NameService, Router, Transport};

/// Forwards datagrams between one client and one server address, dropping
/// the final fragment of a 3-fragment message exactly once, so a fragmented
/// send must be retransmitted before it can reassemble on the other end.
async fn run_lossy_relay(relay: Arc<tokio::net::UdpSocket>, server_addr: SocketAddr) {
    let mut buf = vec![0u8; 65536];
    let mut client_addr: Option<SocketAddr> = None;
    let mut dropped_once = false;
    loop {
        let (len, from) = match relay.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(_) => return,
        };
        let datagram = buf[..len].to_vec();

        if from == server_addr {
            if let Some(c) = client_addr {
                let _ = relay.send_to(&datagram, c).await;
            }
            continue;
        }

        client_addr = Some(from);
        if !dropped_once {
            if let Ok((header, _payload)) = ardp::ArdpHeader::decode(Bytes::from(datagram.clone())) {
                if header.frag_count == 3 && header.frag_index == 2 {
                    dropped_once = true;
                    continue;
                }
            }
        }
        let _ = relay.send_to(&datagram, server_addr).await;
    }
}

#[derive(Default)]
struct RecordingRouter {
    started: Mutex<Vec<(EndpointHandle, SocketAddr)>>,
    received: Mutex<Vec<InboundMessage>>,
    lost: Mutex<Vec<EndpointHandle>>,
}

impl Router for RecordingRouter {
    fn register_endpoint(
        &self,
        endpoint: EndpointHandle,
        remote: SocketAddr,
        _features: EndpointFeatures,
        _unique_name: &str,
    ) {
        self.started.lock().unwrap().push((endpoint, remote));
    }

    fn unregister_endpoint(&self, _endpoint: EndpointHandle) {}

    fn push_message(&self, message: InboundMessage) {
        self.received.lock().unwrap().push(message);
    }

    fn connection_lost(&self, endpoint: EndpointHandle) {
        self.lost.lock().unwrap().push(endpoint);
    }
}

struct NoopNameService;

impl NameService for NoopNameService {
    fn enable(&self) {}
    fn disable(&self) {}
    fn advertise(&self, _name: &str) {}
    fn cancel_advertise(&self, _name: &str) {}
    fn find(&self, _prefix: &str) {}
    fn cancel_find(&self, _prefix: &str) {}
    fn open_interface(&self, _interface: &str) {}
}

async fn wait_until<F: Fn() -> bool>(check: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn connect_and_exchange_one_message() {
    let server_router = Arc::new(RecordingRouter::default());
    let server = Transport::start(Config::default(), server_router.clone(), None);
    let server_addr = server.start_listen("udp:addr=127.0.0.1,port=0").await.unwrap();

    let client_router = Arc::new(RecordingRouter::default());
    let client = Transport::start(Config::default(), client_router.clone(), None);
    client.start_listen("udp:addr=127.0.0.1,port=0").await.unwrap();

    let spec = format!("udp:addr={},port={}", server_addr.ip(), server_addr.port());
    let endpoint = client
        .connect(&spec, Bytes::from_static(b"hello"))
        .await
        .expect("handshake should complete");

    assert!(
        wait_until(|| !server_router.started.lock().unwrap().is_empty(), Duration::from_secs(2)).await,
        "server never saw the incoming endpoint start"
    );

    client.push_bytes(endpoint, Bytes::from_static(b"payload")).await.unwrap();

    assert!(
        wait_until(
            || !server_router.received.lock().unwrap().is_empty(),
            Duration::from_secs(2)
        )
        .await,
        "server never received the message"
    );
    assert_eq!(
        server_router.received.lock().unwrap()[0].bytes,
        Bytes::from_static(b"payload")
    );

    client.stop();
    client.join().await;
    server.stop();
    server.join().await;
}

#[tokio::test]
async fn fragmented_message_reassembles_on_the_receiving_side() {
    let server_router = Arc::new(RecordingRouter::default());
    let server = Transport::start(Config::default(), server_router.clone(), None);
    let server_addr = server.start_listen("udp:addr=127.0.0.1,port=0").await.unwrap();

    let client_router = Arc::new(RecordingRouter::default());
    let client = Transport::start(Config::default(), client_router, None);
    client.start_listen("udp:addr=127.0.0.1,port=0").await.unwrap();

    let spec = format!("udp:addr={},port={}", server_addr.ip(), server_addr.port());
    let endpoint = client.connect(&spec, Bytes::new()).await.unwrap();

    let big = Bytes::from(vec![7u8; 1472 * 2 + 10]);
    client.push_bytes(endpoint, big.clone()).await.unwrap();

    assert!(
        wait_until(
            || !server_router.received.lock().unwrap().is_empty(),
            Duration::from_secs(2)
        )
        .await,
        "server never received the fragmented message"
    );
    assert_eq!(server_router.received.lock().unwrap()[0].bytes, big);

    client.stop();
    client.join().await;
    server.stop();
    server.join().await;
}

#[tokio::test]
async fn fragmented_message_retransmits_after_a_lost_final_fragment() {
    let server_router = Arc::new(RecordingRouter::default());
    let server = Transport::start(Config::default(), server_router.clone(), None);
    let server_addr = server.start_listen("udp:addr=127.0.0.1,port=0").await.unwrap();

    let relay_socket = Arc::new(tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let relay_addr = relay_socket.local_addr().unwrap();
    let relay_task = tokio::spawn(run_lossy_relay(relay_socket, server_addr));

    let mut client_config = Config::default();
    client_config.ardp.data_timeout = Duration::from_millis(50);
    client_config.ardp.data_retries = 5;

    let client_router = Arc::new(RecordingRouter::default());
    let client = Transport::start(client_config, client_router, None);
    client.start_listen("udp:addr=127.0.0.1,port=0").await.unwrap();

    let spec = format!("udp:addr={},port={}", relay_addr.ip(), relay_addr.port());
    let endpoint = client.connect(&spec, Bytes::new()).await.unwrap();

    let big = Bytes::from(vec![7u8; 1472 * 2 + 10]);
    client.push_bytes(endpoint, big.clone()).await.unwrap();

    assert!(
        wait_until(
            || !server_router.received.lock().unwrap().is_empty(),
            Duration::from_secs(5)
        )
        .await,
        "server never received the message after the lost fragment was retransmitted"
    );
    assert_eq!(server_router.received.lock().unwrap()[0].bytes, big);

    client.stop();
    client.join().await;
    server.stop();
    server.join().await;
    relay_task.abort();
}

#[tokio::test]
async fn connect_to_self_is_rejected() {
    let router = Arc::new(RecordingRouter::default());
    let transport = Transport::start(Config::default(), router, None);
    let addr = transport.start_listen("udp:addr=127.0.0.1,port=0").await.unwrap();

    let spec = format!("udp:addr={},port={}", addr.ip(), addr.port());
    let result = transport.connect(&spec, Bytes::new()).await;
    assert!(matches!(result, Err(transport::TransportError::AlreadyListening)));

    transport.stop();
    transport.join().await;
}

#[tokio::test]
async fn connect_with_no_listener_on_the_other_end_times_out() {
    let mut config = Config::default();
    config.ardp.connect_timeout = Duration::from_millis(20);
    config.ardp.connect_retries = 1;

    let router = Arc::new(RecordingRouter::default());
    let transport = Transport::start(config, router, None);
    transport.start_listen("udp:addr=127.0.0.1,port=0").await.unwrap();

    // Nothing is listening on this port.
    let result = transport.connect("udp:addr=127.0.0.1,port=1", Bytes::new()).await;
    assert!(matches!(result, Err(transport::TransportError::Timeout)));

    transport.stop();
    transport.join().await;
}

#[tokio::test]
async fn disconnect_is_observed_exactly_once_by_the_peer() {
    let server_router = Arc::new(RecordingRouter::default());
    let server = Transport::start(Config::default(), server_router.clone(), None);
    let server_addr = server.start_listen("udp:addr=127.0.0.1,port=0").await.unwrap();

    let client_router = Arc::new(RecordingRouter::default());
    let client = Transport::start(Config::default(), client_router, None);
    client.start_listen("udp:addr=127.0.0.1,port=0").await.unwrap();

    let spec = format!("udp:addr={},port={}", server_addr.ip(), server_addr.port());
    let endpoint = client.connect(&spec, Bytes::new()).await.unwrap();

    client.disconnect(endpoint);

    assert!(
        wait_until(
            || !server_router.lost.lock().unwrap().is_empty(),
            Duration::from_secs(2)
        )
        .await,
        "server never observed the disconnect"
    );
    assert_eq!(server_router.lost.lock().unwrap().len(), 1);

    client.stop();
    client.join().await;
    server.stop();
    server.join().await;
}
