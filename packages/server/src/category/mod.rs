//! Self-referential category hierarchy.
//!
//! [`CategoryService`] owns every write to the `category` table and keeps the
//! tree invariants: `level` follows the parent, only level-1 categories accept
//! children, and slugs are unique and fixed once assigned.

mod error;
pub mod hierarchy;
mod service;
pub mod slug;

pub use error::CategoryError;
pub use hierarchy::CategoryNode;
pub use service::{
    CategoryChanges, CategoryService, ImageRef, ListParams, NewCategory, SortField,
};
