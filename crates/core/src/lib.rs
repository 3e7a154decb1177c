//! `stockroom-core`: shared building blocks for the stockroom workspace.
//!
//! Identifiers, the domain error model and the small set of traits the
//! inventory model is written against. No IO lives here.

pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;
pub mod version;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ItemId, MovementId};
pub use value_object::ValueObject;
pub use version::{ExpectedVersion, Versioned};
