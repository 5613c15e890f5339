//! Identity and address allocation for new containers.
//!
//! The numeric id comes from the upstream "next free id" endpoint. Both
//! addresses are derived from the configured gateways by overwriting
//! their last octet with the id, so the same id always maps to the same
//! addresses. Nothing is reserved: two concurrent allocations may be
//! handed the same id, and the upstream create call decides which wins.

use std::net::{Ipv4Addr, Ipv6Addr};

use log::info;
use rand::rngs::OsRng;
use rand::Rng;
use serde::Serialize;
use serde_json::Value;

use crate::error::AllocationError;
use crate::upstream::{Method, Params, Upstream};

pub const NEXTID_PATH: &str = "/api2/json/cluster/nextid";

const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*-_=+";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub length: usize,
    /// Extend the alphanumeric set with punctuation.
    pub symbols: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            length: 12,
            symbols: false,
        }
    }
}

impl PasswordPolicy {
    pub fn charset(&self) -> Vec<u8> {
        let mut set = ALPHANUMERIC.to_vec();
        if self.symbols {
            set.extend_from_slice(SYMBOLS);
        }
        set
    }

    /// Draws a fresh password from the operating system CSPRNG.
    pub fn generate(&self) -> String {
        let charset = self.charset();
        let mut rng = OsRng;
        (0..self.length)
            .map(|_| charset[rng.gen_range(0..charset.len())] as char)
            .collect()
    }
}

/// Everything a new container needs before the create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: u32,
    pub ipv4: Ipv4Addr,
    pub ipv6: Ipv6Addr,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Allocator {
    gateway: Ipv4Addr,
    ipv6_gateway: Ipv6Addr,
    policy: PasswordPolicy,
}

impl Allocator {
    pub fn new(gateway: Ipv4Addr, ipv6_gateway: Ipv6Addr, policy: PasswordPolicy) -> Self {
        Self {
            gateway,
            ipv6_gateway,
            policy,
        }
    }

    /// Pure function of (gateway, id). Ids outside 1-254 are rejected.
    pub fn derive_addresses(&self, id: u32) -> Result<(Ipv4Addr, Ipv6Addr), AllocationError> {
        let last = u8::try_from(id)
            .ok()
            .filter(|b| (1..=254).contains(b))
            .ok_or(AllocationError::IdOutOfRange(id))?;

        let mut v4 = self.gateway.octets();
        v4[3] = last;
        let mut v6 = self.ipv6_gateway.octets();
        v6[15] = last;

        Ok((Ipv4Addr::from(v4), Ipv6Addr::from(v6)))
    }

    pub async fn next_id(&self, upstream: &dyn Upstream) -> Result<u32, AllocationError> {
        let envelope = upstream
            .call(Method::Get, NEXTID_PATH, &Params::new())
            .await?;
        let id = parse_next_id(envelope.data())?;
        info!("Next free container id: {}", id);
        Ok(id)
    }

    /// Queries the next free id and derives addresses and a password for it.
    pub async fn allocate(&self, upstream: &dyn Upstream) -> Result<Identity, AllocationError> {
        let id = self.next_id(upstream).await?;
        let (ipv4, ipv6) = self.derive_addresses(id)?;
        Ok(Identity {
            id,
            ipv4,
            ipv6,
            password: self.policy.generate(),
        })
    }
}

fn parse_next_id(data: Option<&Value>) -> Result<u32, AllocationError> {
    match data {
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| AllocationError::InvalidNextId(s.clone())),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| AllocationError::InvalidNextId(n.to_string())),
        Some(other) => Err(AllocationError::InvalidNextId(other.to_string())),
        None => Err(AllocationError::InvalidNextId("missing".into())),
    }
}
