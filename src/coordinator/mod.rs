//! Metadata coordinator: membership, placement, failure detection, repair

pub mod catalog;
pub mod placement;
pub mod registry;
pub mod server;

pub use catalog::{Catalog, FileRecord};
pub use registry::{NodeRecord, NodeRegistry};
pub use server::{ClusterState, Coordinator, CoordinatorHandle};
