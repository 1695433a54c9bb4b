//! Reconciliation runtime that mirrors open tracker items into chat threads.
//!
//! The bridge owns the durable item-to-thread mapping and converges it
//! against live tracker state once per poll cycle: new open items gain a
//! mirror thread, drifted titles are renamed, and closed items get a notice
//! before their thread is locked and the mapping entry retired.

pub mod mirror_bridge;

pub use mirror_bridge::{
    run_mirror_bridge, MirrorBridgeRuntime, MirrorBridgeRuntimeConfig, PollCycleReport,
};
