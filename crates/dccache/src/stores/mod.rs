#![forbid(unsafe_code)]

//! Record tables and the secondary indices kept next to them.

mod macros;
mod psk;
mod str_index;
mod table;
mod tags;

pub use macros::{MacroRow, MacroStore};
pub use psk::PskStore;
pub use str_index::StrIndex;
pub use table::Table;
pub use tags::{TagChange, TagStore};
