#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use lxcgate::allocator::{Allocator, PasswordPolicy};
use lxcgate::error::{StoreError, UpstreamError};
use lxcgate::orchestrator::{NetworkTemplate, Orchestrator, SettleStrategy, Settings};
use lxcgate::store::{ContainerStore, SqliteStore};
use lxcgate::types::{ContainerRecord, ContainerStatus, ResourceRequest};
use lxcgate::upstream::{Envelope, Method, Params, Upstream};

pub const NEXTID: &str = "/api2/json/cluster/nextid";
pub const LXC: &str = "/api2/json/nodes/pve/lxc";

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub params: Params,
}

/// Upstream double that records every call and answers from per-endpoint
/// queues. Endpoints without a queued answer get `{"data": null}`.
#[derive(Default)]
pub struct MockUpstream {
    calls: Mutex<Vec<RecordedCall>>,
    responses: Mutex<HashMap<(String, String), VecDeque<Result<Envelope, UpstreamError>>>>,
}

impl MockUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn key(method: Method, path: &str) -> (String, String) {
        (method.as_str().to_string(), path.to_string())
    }

    pub fn respond(&self, method: Method, path: &str, data: Value) {
        self.push(method, path, Ok(envelope(json!({ "data": data }))));
    }

    pub fn fail(&self, method: Method, path: &str, status: u16, message: &str) {
        self.push(
            method,
            path,
            Err(UpstreamError::Status {
                status,
                message: message.to_string(),
                envelope: Some(envelope(json!({ "data": message }))),
            }),
        );
    }

    fn push(&self, method: Method, path: &str, result: Result<Envelope, UpstreamError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(Self::key(method, path))
            .or_default()
            .push_back(result);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: Method, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.path == path)
            .collect()
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn call(
        &self,
        method: Method,
        path: &str,
        params: &Params,
    ) -> Result<Envelope, UpstreamError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            path: path.to_string(),
            params: params.clone(),
        });
        self.responses
            .lock()
            .unwrap()
            .get_mut(&Self::key(method, path))
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(envelope(json!({ "data": null }))))
    }
}

pub fn envelope(value: Value) -> Envelope {
    serde_json::from_value(value).unwrap()
}

pub fn settings(settle: SettleStrategy) -> Settings {
    Settings {
        node: "pve".into(),
        template_storage: "local".into(),
        network: NetworkTemplate {
            interface: "eth0".into(),
            bridge: "vmbr1".into(),
            gateway: "10.0.0.1".parse().unwrap(),
            ipv6_gateway: "fd00::1".parse().unwrap(),
            ipv4_prefix: 24,
            ipv6_prefix: 64,
        },
        settle,
    }
}

/// Mirror whose every read and write fails, as with a locked database.
pub struct FailingStore;

impl ContainerStore for FailingStore {
    fn insert(&self, _record: &ContainerRecord) -> Result<(), StoreError> {
        Err(StoreError::Poisoned)
    }

    fn get(&self, _id: u32) -> Result<Option<ContainerRecord>, StoreError> {
        Err(StoreError::Poisoned)
    }

    fn list(&self) -> Result<Vec<ContainerRecord>, StoreError> {
        Err(StoreError::Poisoned)
    }

    fn update_resources(&self, _id: u32, _resources: &ResourceRequest) -> Result<(), StoreError> {
        Err(StoreError::Poisoned)
    }

    fn set_status(&self, _id: u32, _status: ContainerStatus) -> Result<(), StoreError> {
        Err(StoreError::Poisoned)
    }

    fn remove(&self, _id: u32) -> Result<bool, StoreError> {
        Err(StoreError::Poisoned)
    }
}

pub struct Harness {
    pub upstream: Arc<MockUpstream>,
    pub store: Arc<SqliteStore>,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn harness() -> Harness {
    harness_with(SettleStrategy::Fixed(Duration::ZERO))
}

pub fn harness_with(settle: SettleStrategy) -> Harness {
    let upstream = MockUpstream::new();
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let allocator = Allocator::new(
        "10.0.0.1".parse().unwrap(),
        "fd00::1".parse().unwrap(),
        PasswordPolicy::default(),
    );
    let orchestrator = Arc::new(Orchestrator::new(
        upstream.clone(),
        store.clone(),
        allocator,
        settings(settle),
    ));
    Harness {
        upstream,
        store,
        orchestrator,
    }
}

/// Orchestrator over a mock upstream and a [`FailingStore`].
pub fn broken_store_harness() -> (Arc<MockUpstream>, Arc<Orchestrator>) {
    let upstream = MockUpstream::new();
    let allocator = Allocator::new(
        "10.0.0.1".parse().unwrap(),
        "fd00::1".parse().unwrap(),
        PasswordPolicy::default(),
    );
    let orchestrator = Arc::new(Orchestrator::new(
        upstream.clone(),
        Arc::new(FailingStore),
        allocator,
        settings(SettleStrategy::Fixed(Duration::ZERO)),
    ));
    (upstream, orchestrator)
}
