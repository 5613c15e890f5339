//! REST façade that provisions LXC containers on a Proxmox VE cluster and
//! mirrors their declared state in a local SQLite database.

pub mod allocator;
pub mod config;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod store;
pub mod types;
pub mod upstream;
