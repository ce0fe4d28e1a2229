#![forbid(unsafe_code)]

#[macro_use]
pub mod domain;

pub mod arena;
mod cache;
pub mod clock;
mod data;
mod dump;
mod error;
pub mod expression;
pub mod interval;
pub mod notify;
pub mod persistence;
mod queries;
pub mod schedule;
pub mod snapshot;
mod status;
pub mod stores;
pub mod strpool;
pub mod sync;
pub mod topology;

pub use cache::{ConfigCache, ItemChange, MaintenanceUpdate, SecretStore, Services};
pub use data::{CacheOptions, ConfigData, HistoryData, ItemRuntime};
pub use error::Error;
pub use queries::{MacroUpdates, ProxyConfigUpdate};
pub use status::{CacheStatus, StatusCounts, TriggerCounts};
