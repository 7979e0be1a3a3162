//! Backend adapters, one per transport

pub mod memory;

#[cfg(feature = "nats")]
pub mod nats;

pub use memory::MemoryBus;

#[cfg(feature = "nats")]
pub use nats::NatsBus;
