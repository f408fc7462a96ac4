//! # mono-types
//!
//! Static knowledge about the Mono type system that needs no live runtime:
//! the type-code taxonomy with its classification tables, metadata tokens and
//! attribute flag words.
pub mod attrs;
pub mod error;
pub mod kind;
pub mod token;

pub use kind::{PointerWidth, TypeKind};
pub use token::{MetadataTable, Token};
