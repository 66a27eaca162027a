//! Scan, resolve, build and score services.

pub mod agent;
pub mod bench;
pub mod graph;
pub mod pipeline;
pub mod resolver;
pub mod scanners;
pub mod scoring;
pub mod stats;
