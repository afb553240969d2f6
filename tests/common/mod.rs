//! Shared test infrastructure for container discovery integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{AuthorityObject, Catalog, MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use tokio::sync::mpsc;

use docker_dns::authority::DockerAuthority;
use docker_dns::config::SoaConfig;
use docker_dns::registry::ContainerRegistry;
use docker_dns::runtime::{ContainerEvent, ContainerRuntime, EventStream, RuntimeError};
use docker_dns::{ContainerSnapshot, NetworkAttachment, NetworkMode};

// --- Constants ---

pub const TEST_TTL: u32 = 3600;

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// Implements `ResponseHandler` so it can be passed to `Catalog::handle_request()`.
/// The response is serialized via `MessageResponse::destructive_emit()` and stored
/// as raw wire-format bytes, which can then be parsed with `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- Mock container runtime ---

/// In-memory stand-in for the Docker daemon.
///
/// Holds a mutable set of container snapshots and an injectable event
/// channel, so tests can script a daemon's lifecycle without a socket.
pub struct MockRuntime {
    snapshots: Mutex<HashMap<String, ContainerSnapshot>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<Result<ContainerEvent, RuntimeError>>>>,
    pub events_tx: mpsc::UnboundedSender<Result<ContainerEvent, RuntimeError>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            snapshots: Mutex::new(HashMap::new()),
            events_rx: Mutex::new(Some(events_rx)),
            events_tx,
        }
    }

    /// Install or replace a snapshot without emitting an event.
    pub fn put(&self, snapshot: ContainerSnapshot) {
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.id.clone(), snapshot);
    }

    /// Drop a snapshot, as the daemon does when a container is gone.
    pub fn forget(&self, id: &str) {
        self.snapshots.lock().unwrap().remove(id);
    }

    /// Emit an event as if it came from the daemon.
    pub fn emit(&self, event: ContainerEvent) {
        self.events_tx
            .send(Ok(event))
            .expect("event channel closed");
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn list_running(&self) -> Result<Vec<String>, RuntimeError> {
        Ok(self.snapshots.lock().unwrap().keys().cloned().collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerSnapshot, RuntimeError> {
        self.snapshots
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }

    async fn subscribe_events(&self) -> Result<EventStream, RuntimeError> {
        let mut rx = self
            .events_rx
            .lock()
            .unwrap()
            .take()
            .expect("subscribe_events called twice");
        Ok(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed())
    }
}

// --- Snapshot builder ---

pub struct SnapshotBuilder {
    snapshot: ContainerSnapshot,
}

impl SnapshotBuilder {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            snapshot: ContainerSnapshot {
                id: id.to_string(),
                name: format!("/{name}"),
                hostname: String::new(),
                labels: HashMap::new(),
                default_address: String::new(),
                networks: BTreeMap::new(),
                network_mode: NetworkMode::Network("default".to_string()),
            },
        }
    }

    pub fn address(mut self, address: &str) -> Self {
        self.snapshot.default_address = address.to_string();
        self
    }

    pub fn hostname(mut self, hostname: &str) -> Self {
        self.snapshot.hostname = hostname.to_string();
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.snapshot
            .labels
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn network(mut self, name: &str, address: &str, aliases: &[&str]) -> Self {
        self.snapshot.networks.insert(
            name.to_string(),
            NetworkAttachment {
                address: address.to_string(),
                aliases: aliases.iter().map(|a| a.to_string()).collect(),
            },
        );
        self
    }

    pub fn network_mode(mut self, mode: NetworkMode) -> Self {
        self.snapshot.network_mode = mode;
        self
    }

    pub fn build(self) -> ContainerSnapshot {
        self.snapshot
    }
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request`.
pub fn build_request(name: &str, record_type: RecordType, id: u16) -> Request {
    let bytes = build_query_bytes(name, record_type, id);
    let msg = parse_message_request(&bytes);
    let src: SocketAddr = "127.0.0.1:54321".parse().unwrap();
    Request::new(msg, src, Protocol::Udp)
}

/// Build a Catalog serving `zones` out of the shared registry.
pub fn build_catalog(registry: &ContainerRegistry, zones: &[&str]) -> Catalog {
    let mut catalog = Catalog::new();
    for zone in zones {
        let authority = DockerAuthority::new(zone, registry.clone(), TEST_TTL, SoaConfig::default())
            .expect("failed to create DockerAuthority");
        let origin = authority.origin().clone();
        let authority: Arc<dyn AuthorityObject> = Arc::new(authority);
        catalog.upsert(origin, vec![authority]);
    }
    catalog
}

// --- Response helpers ---

/// Execute a query through the catalog and return the parsed response.
pub async fn execute_query(catalog: &Catalog, name: &str, record_type: RecordType, id: u16) -> Message {
    let request = build_request(name, record_type, id);
    let handler = TestResponseHandler::new();
    catalog.handle_request(&request, handler.clone()).await;
    handler.into_message()
}

/// Extract A addresses from a response.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(Ipv4Addr::from(*a)),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert response is successful with exactly the expected IPv4 addresses.
pub fn assert_a_response(msg: &Message, expected_ips: &[Ipv4Addr]) {
    assert_response_code(msg, ResponseCode::NoError);
    let mut actual = extract_a_ips(msg);
    actual.sort();
    let mut expected: Vec<Ipv4Addr> = expected_ips.to_vec();
    expected.sort();
    assert_eq!(
        actual, expected,
        "A records mismatch.\nactual:   {:?}\nexpected: {:?}",
        actual, expected
    );
}

/// Wait until `predicate` holds against the registry, or panic after a
/// second. Reconciliation runs on spawned tasks, so tests poll.
pub async fn wait_for<F>(registry: &ContainerRegistry, predicate: F)
where
    F: Fn(&ContainerRegistry) -> bool,
{
    for _ in 0..100 {
        if predicate(registry) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 1s");
}
