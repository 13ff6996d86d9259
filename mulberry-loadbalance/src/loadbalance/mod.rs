pub mod node;
pub mod pool;
pub mod health_checker;


pub use node::Node;
pub use pool::{NodePool, NodeSnapshot, PoolSnapshot};
pub use health_checker::{HealthMonitor, HealthSummary, Probe, TcpProbe};
