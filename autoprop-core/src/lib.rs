//! autoprop Core - Entity Types
//!
//! Documents, suggestion records, undo history, selection queries and
//! configuration. Every other crate depends on this one; it holds data and
//! the accessors over it, none of the automation rules.

mod config;
mod document;
mod enums;
mod error;
mod filter;
mod history;
mod identity;
mod suggestion;
mod value;

pub use config::*;
pub use document::*;
pub use enums::*;
pub use error::*;
pub use filter::*;
pub use history::*;
pub use identity::*;
pub use suggestion::*;
pub use value::*;
