//! Per-call demultiplexing of gateway audio into capture writers

mod router;

pub use router::{MediaStreamRouter, RouterStats};
