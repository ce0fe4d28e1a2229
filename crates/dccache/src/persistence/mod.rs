#![forbid(unsafe_code)]

//! Trend timers outliving a restart.

mod repo;

pub use repo::{NoopRepository, SqliteRepository, TimerRepository};
