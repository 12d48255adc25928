//! Sample buffers between the decode pass and the device callback.

pub mod fifo;

pub use fifo::{PlaybackFifo, SharedFifo};
