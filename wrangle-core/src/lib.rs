//! Core domain types for OSM extract wrangling.
//!
//! The model mirrors the relational shape of an ingested extract: entities
//! (nodes, ways and relations), their cleaned tags, and the ordered
//! membership rows that give ways their geometry and relations their
//! structure. Storage adapters live behind the `store-sqlite` feature.

#![forbid(unsafe_code)]

mod element;
mod entity;
mod member;
pub mod store;
mod tag;
pub mod test_support;

pub use element::{ElementKind, EntityRef, UnknownElementKind};
pub use entity::{Entity, EntityMetadata};
pub use member::{RelationMember, ShapedElement, WayMember};
pub use store::EntityStore;
#[cfg(feature = "store-sqlite")]
pub use store::{SqliteEntityStore, SqliteEntityStoreError};
pub use tag::{CleaningFlag, REGULAR_KEY_TYPE, Tag, key_type};
