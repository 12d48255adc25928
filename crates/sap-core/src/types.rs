//! Core domain types for sap.

pub mod stream;
pub mod volume;

pub use stream::{ChannelLayout, SampleFormat, StreamDescriptor};
pub use volume::Volume;
