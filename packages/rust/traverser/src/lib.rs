//! Cross-container traversal.
//!
//! This crate provides:
//! - [`engine`]: bounded breadth-first traversal over a [`ContainerAccessor`](modexport_shared::ContainerAccessor)
//! - [`ContainerSink`] / [`TraversalObserver`]: where finished containers and progress events go

pub mod engine;

pub use engine::{
    ContainerSink, ContainerTraverser, NoopObserver, TraversalObserver, TraversalReport,
    peer_containers,
};
