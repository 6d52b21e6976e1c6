//! Cluster API transports

pub mod builds;
pub mod client;
pub mod deployments;
