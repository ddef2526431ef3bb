//! Core trait abstractions at the seams of the pipeline.

pub mod adapter;
pub mod store;
pub mod transport;
