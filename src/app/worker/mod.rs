//! Producers, the store writer, and retry
//!
//! - [`producer`] - the [`UnitProducer`] strategies for markets and stations
//!   and the producer loop
//! - [`consumer`] - the single [`StoreWriter`] that commits units and
//!   advances the checkpoint
//! - [`retry`] - exponential backoff for transient remote errors
//! - [`config`] - per-phase producer pool settings

pub mod config;
pub mod consumer;
pub mod producer;
pub mod retry;

pub use config::WorkerConfig;
pub use consumer::{StoreWriter, WriterOutput};
pub use producer::{
    run_producer, MarketProducer, ProducedUnit, ProducerStats, StationProducer, UnitOutcome,
    UnitProducer,
};
pub use retry::{Attempted, RetryPolicy};
