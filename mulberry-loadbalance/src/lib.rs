//! Mulberry Load Balance Library
//!
//! This library provides the node selection engine for the Mulberry load balancer including:
//! - Backend nodes with liveness and weight state
//! - A weighted max-heap node pool with decay on selection
//! - Periodic health checking

pub mod loadbalance;

// Re-export commonly used types
pub use loadbalance::{
    HealthMonitor, HealthSummary, Node, NodePool, NodeSnapshot, PoolSnapshot, Probe, TcpProbe,
};
pub use mulberry_core::SelectionMode;
