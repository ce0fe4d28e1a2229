pub mod cli;
pub mod error;
pub mod rows;
pub mod signals;
