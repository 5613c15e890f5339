//! Data structures shared by the orchestrator, the store and the HTTP
//! surface.
//!
//! Request types are deserialised from caller JSON. On the wire a zero or
//! missing resource field means "leave unchanged"; internally that is an
//! explicit `None`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::upstream::Envelope;

/// Last known state of a container, as recorded by this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Creating,
    Stopped,
    Running,
}

impl ContainerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerStatus::Creating => "creating",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::Running => "running",
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(ContainerStatus::Creating),
            "stopped" => Ok(ContainerStatus::Stopped),
            "running" => Ok(ContainerStatus::Running),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// One row of the local state mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: u32,
    pub hostname: String,
    pub password: String,
    #[serde(rename = "ip")]
    pub ipv4: String,
    pub ipv6: String,
    /// MB
    pub memory: u32,
    pub cpu: u32,
    /// GB
    pub disk: u32,
    pub status: ContainerStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateRequest {
    pub hostname: String,
    /// File name of the template under the template storage's `vztmpl`.
    pub template: String,
    pub storage: String,
    pub memory: u32,
    pub cpu: u32,
    pub disk: u32,
}

/// Resource changes. Each field is applied independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ResourceRequest {
    #[serde(default)]
    pub cpu: Option<u32>,
    #[serde(default)]
    pub memory: Option<u32>,
    #[serde(default)]
    pub disk: Option<u32>,
}

impl ResourceRequest {
    /// Drops zero values, which callers use to mean "unchanged".
    pub fn normalized(self) -> Self {
        let positive = |v: Option<u32>| v.filter(|n| *n > 0);
        Self {
            cpu: positive(self.cpu),
            memory: positive(self.memory),
            disk: positive(self.disk),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none() && self.disk.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SwapRequest {
    /// MB
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Stop,
    Restart,
}

impl LifecycleAction {
    /// Last segment of the upstream `status/...` endpoint.
    pub fn endpoint(self) -> &'static str {
        match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Stop => "stop",
            LifecycleAction::Restart => "reboot",
        }
    }

    /// Status recorded locally once the upstream accepted the action.
    pub fn resulting_status(self) -> ContainerStatus {
        match self {
            LifecycleAction::Start | LifecycleAction::Restart => ContainerStatus::Running,
            LifecycleAction::Stop => ContainerStatus::Stopped,
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Stop => "stop",
            LifecycleAction::Restart => "restart",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateResponse {
    pub id: u32,
    pub hostname: String,
    pub password: String,
    pub ip: String,
    pub ipv6: String,
    pub result: Envelope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_resources_mean_unchanged() {
        let req: ResourceRequest =
            serde_json::from_str(r#"{"cpu": 0, "memory": 1024}"#).unwrap();
        let req = req.normalized();
        assert_eq!(req.cpu, None);
        assert_eq!(req.memory, Some(1024));
        assert_eq!(req.disk, None);
        assert!(!req.is_empty());
        assert!(ResourceRequest::default().normalized().is_empty());
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            ContainerStatus::Creating,
            ContainerStatus::Stopped,
            ContainerStatus::Running,
        ] {
            assert_eq!(status.as_str().parse::<ContainerStatus>().unwrap(), status);
        }
        assert!("paused".parse::<ContainerStatus>().is_err());
    }

    #[test]
    fn restart_maps_to_reboot() {
        assert_eq!(LifecycleAction::Restart.endpoint(), "reboot");
        assert_eq!(
            LifecycleAction::Restart.resulting_status(),
            ContainerStatus::Running
        );
        assert_eq!(
            LifecycleAction::Stop.resulting_status(),
            ContainerStatus::Stopped
        );
    }
}
