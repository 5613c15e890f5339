//! Container lifecycle orchestration.
//!
//! Every operation follows the same two-phase contract: perform the
//! upstream calls in order, then write the outcome to the local mirror.
//! A failing upstream call aborts the sequence and is returned to the
//! caller. A failing local write is only logged, since the upstream
//! change has already been committed and the operation substantively
//! succeeded. The one exception to abort-on-failure is the stop phase of
//! [`Orchestrator::delete`], whose failure is tolerated.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::time::{sleep, Instant};

use crate::allocator::Allocator;
use crate::config::Config;
use crate::error::OrchestratorError;
use crate::store::ContainerStore;
use crate::types::{
    ContainerRecord, ContainerStatus, CreateRequest, CreateResponse, DeleteResponse,
    LifecycleAction, ResourceRequest, SwapRequest,
};
use crate::upstream::{params, Envelope, Method, Params, Upstream};

/// Shape of the `net0` interface given to every new container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkTemplate {
    pub interface: String,
    pub bridge: String,
    pub gateway: Ipv4Addr,
    pub ipv6_gateway: Ipv6Addr,
    pub ipv4_prefix: u8,
    pub ipv6_prefix: u8,
}

impl NetworkTemplate {
    pub fn net0(&self, ipv4: Ipv4Addr, ipv6: Ipv6Addr) -> String {
        format!(
            "name={},bridge={},ip={}/{},gw={},ip6={}/{},gw6={}",
            self.interface,
            self.bridge,
            ipv4,
            self.ipv4_prefix,
            self.gateway,
            ipv6,
            self.ipv6_prefix,
            self.ipv6_gateway
        )
    }
}

/// How long to wait between the forced stop and the delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStrategy {
    /// Sleep unconditionally.
    Fixed(Duration),
    /// Poll the container status until it reports `stopped` or the
    /// timeout elapses. The delete is attempted either way.
    Poll { interval: Duration, timeout: Duration },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub node: String,
    pub template_storage: String,
    pub network: NetworkTemplate,
    pub settle: SettleStrategy,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            node: config.node.clone(),
            template_storage: config.template_storage.clone(),
            network: config.network_template(),
            settle: config.settle_strategy(),
        }
    }
}

pub struct Orchestrator {
    upstream: Arc<dyn Upstream>,
    store: Arc<dyn ContainerStore>,
    allocator: Allocator,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        store: Arc<dyn ContainerStore>,
        allocator: Allocator,
        settings: Settings,
    ) -> Self {
        Self {
            upstream,
            store,
            allocator,
            settings,
        }
    }

    fn lxc_path(&self) -> String {
        format!("/api2/json/nodes/{}/lxc", self.settings.node)
    }

    fn container_path(&self, id: u32) -> String {
        format!("{}/{}", self.lxc_path(), id)
    }

    /// Allocates an identity and creates the container, not started.
    pub async fn create(&self, req: CreateRequest) -> Result<CreateResponse, OrchestratorError> {
        if req.hostname.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest("hostname is required".into()));
        }
        if req.template.trim().is_empty() || req.storage.trim().is_empty() {
            return Err(OrchestratorError::InvalidRequest(
                "template and storage are required".into(),
            ));
        }
        info!("Creating container {:?}", req);

        let identity = self.allocator.allocate(self.upstream.as_ref()).await?;
        let net0 = self.settings.network.net0(identity.ipv4, identity.ipv6);
        let create = params([
            ("vmid", identity.id.to_string()),
            ("hostname", req.hostname.clone()),
            ("cores", req.cpu.to_string()),
            ("memory", req.memory.to_string()),
            (
                "ostemplate",
                format!("{}:vztmpl/{}", self.settings.template_storage, req.template),
            ),
            ("storage", req.storage.clone()),
            ("rootfs", format!("{}:{}", req.storage, req.disk)),
            ("net0", net0),
            ("password", identity.password.clone()),
            ("start", "0".to_string()),
        ]);

        let result = self
            .upstream
            .call(Method::Post, &self.lxc_path(), &create)
            .await?;
        info!("Container {} created upstream", identity.id);

        let record = ContainerRecord {
            id: identity.id,
            hostname: req.hostname.clone(),
            password: identity.password.clone(),
            ipv4: identity.ipv4.to_string(),
            ipv6: identity.ipv6.to_string(),
            memory: req.memory,
            cpu: req.cpu,
            disk: req.disk,
            status: ContainerStatus::Stopped,
        };
        if let Err(e) = self.store.insert(&record) {
            error!("Failed to record container {} locally: {}", identity.id, e);
        }

        Ok(CreateResponse {
            id: identity.id,
            hostname: req.hostname,
            password: identity.password,
            ip: record.ipv4,
            ipv6: record.ipv6,
            result,
        })
    }

    /// Applies cpu/memory through the config endpoint and disk through
    /// the resize endpoint. Each call is made only when needed. A failure
    /// in the second call does not roll back the first.
    pub async fn set_resources(
        &self,
        id: u32,
        req: ResourceRequest,
    ) -> Result<Envelope, OrchestratorError> {
        let req = req.normalized();
        self.require_record(id)?;
        info!("Setting resources of container {}: {:?}", id, req);

        let mut merged = Envelope::default();
        if req.is_empty() {
            return Ok(merged);
        }

        let mut config = Params::new();
        if let Some(cores) = req.cpu {
            config.insert("cores".into(), cores.to_string());
        }
        if let Some(memory) = req.memory {
            config.insert("memory".into(), memory.to_string());
        }
        if !config.is_empty() {
            let path = format!("{}/config", self.container_path(id));
            merged.merge(self.upstream.call(Method::Put, &path, &config).await?);
        }

        if let Some(disk) = req.disk {
            let path = format!("{}/resize", self.container_path(id));
            let resize = params([("disk", "rootfs".to_string()), ("size", format!("{disk}G"))]);
            merged.merge(self.upstream.call(Method::Put, &path, &resize).await?);
        }

        if let Err(e) = self.store.update_resources(id, &req) {
            error!("Failed to update resources of container {} locally: {}", id, e);
        }
        Ok(merged)
    }

    pub async fn set_swap(&self, id: u32, req: SwapRequest) -> Result<Envelope, OrchestratorError> {
        info!("Setting swap of container {} to {} MB", id, req.size);
        let path = format!("{}/config", self.container_path(id));
        let swap = params([("swap", req.size)]);
        Ok(self.upstream.call(Method::Put, &path, &swap).await?)
    }

    pub async fn lifecycle(
        &self,
        id: u32,
        action: LifecycleAction,
    ) -> Result<Envelope, OrchestratorError> {
        info!("Container {}: {}", id, action);
        let path = format!("{}/status/{}", self.container_path(id), action.endpoint());
        let result = self
            .upstream
            .call(Method::Post, &path, &Params::new())
            .await?;

        if let Err(e) = self.store.set_status(id, action.resulting_status()) {
            error!("Failed to update status of container {} locally: {}", id, e);
        }
        Ok(result)
    }

    pub async fn start(&self, id: u32) -> Result<Envelope, OrchestratorError> {
        self.lifecycle(id, LifecycleAction::Start).await
    }

    pub async fn stop(&self, id: u32) -> Result<Envelope, OrchestratorError> {
        self.lifecycle(id, LifecycleAction::Stop).await
    }

    pub async fn restart(&self, id: u32) -> Result<Envelope, OrchestratorError> {
        self.lifecycle(id, LifecycleAction::Restart).await
    }

    /// Force-stops, waits for the stop to settle, then deletes and purges.
    ///
    /// A failed stop is logged and the delete is attempted anyway, the
    /// container may already be stopped. The result only confirms that
    /// the upstream accepted the delete, not that it has completed.
    pub async fn delete(&self, id: u32) -> Result<DeleteResponse, OrchestratorError> {
        info!("Deleting container {}", id);

        let stop_path = format!("{}/status/stop", self.container_path(id));
        let stop = params([("force", 1), ("timeout", 30)]);
        match self.upstream.call(Method::Post, &stop_path, &stop).await {
            Ok(_) => info!("Stop issued for container {}", id),
            Err(e) => warn!("Failed to stop container {} (may already be stopped): {}", id, e),
        }

        self.settle(id).await;

        let purge = params([("force", 1), ("purge", 1)]);
        let result = self
            .upstream
            .call(Method::Delete, &self.container_path(id), &purge)
            .await?;
        debug!("Delete result for container {}: {:?}", id, result);

        match self.store.remove(id) {
            Ok(true) => {}
            Ok(false) => warn!("Container {} had no local record", id),
            Err(e) => error!("Failed to remove container {} locally: {}", id, e),
        }

        Ok(DeleteResponse {
            status: format!("container {id} deletion accepted"),
        })
    }

    async fn settle(&self, id: u32) {
        match self.settings.settle {
            SettleStrategy::Fixed(delay) => {
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
            SettleStrategy::Poll { interval, timeout } => {
                let deadline = Instant::now() + timeout;
                loop {
                    match self.current_status(id).await {
                        Ok(Some(status)) if status == "stopped" => {
                            debug!("Container {} reports stopped", id);
                            return;
                        }
                        Ok(status) => debug!("Container {} status: {:?}", id, status),
                        Err(e) => warn!("Failed to poll status of container {}: {}", id, e),
                    }
                    if Instant::now() >= deadline {
                        warn!("Container {} did not report stopped within {:?}", id, timeout);
                        return;
                    }
                    sleep(interval).await;
                }
            }
        }
    }

    /// The live status string reported upstream, e.g. `running`.
    pub async fn current_status(&self, id: u32) -> Result<Option<String>, OrchestratorError> {
        let path = format!("{}/status/current", self.container_path(id));
        let envelope = self
            .upstream
            .call(Method::Get, &path, &Params::new())
            .await?;
        Ok(envelope
            .data()
            .and_then(|d| d.get("status"))
            .and_then(|s| s.as_str())
            .map(str::to_string))
    }

    pub fn record(&self, id: u32) -> Result<ContainerRecord, OrchestratorError> {
        self.store.get(id)?.ok_or(OrchestratorError::NotFound(id))
    }

    pub fn records(&self) -> Result<Vec<ContainerRecord>, OrchestratorError> {
        Ok(self.store.list()?)
    }

    /// Fails with `NotFound` when the mirror has no such container. If the
    /// mirror cannot be read the check is skipped and logged.
    fn require_record(&self, id: u32) -> Result<(), OrchestratorError> {
        match self.store.get(id) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(OrchestratorError::NotFound(id)),
            Err(e) => {
                error!("Failed to read container {} locally: {}", id, e);
                Ok(())
            }
        }
    }
}
