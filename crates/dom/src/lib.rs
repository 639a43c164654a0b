//! Document model for the external `<use>` resolver
//!
//! A small, index-based DOM: enough tree, attribute and selector machinery to
//! stand in for a host document, plus a parser for the files the resolver loads.
//!
//! ## Core Design
//!
//! ```text
//! markup → parser → DomArena (owned) → selector / serializer
//!                       ↓
//!                NodeId (u32), mutation journal
//! ```

pub mod arena;
pub mod error;
pub mod parser;
pub mod selector;
pub mod serializer;
pub mod types;

pub use arena::DomArena;
pub use error::{DomError, Result};
pub use parser::parse;
pub use selector::Selector;
pub use types::*;
