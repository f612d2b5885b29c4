//! Core types shared across the platen crates: reference identifiers,
//! the error taxonomy, the engine registry and service configuration.

pub mod config;
pub mod engine;
pub mod error;
pub mod fsutil;
pub mod identifier;

pub use config::{KeepJobs, RetentionKind, ServiceConfig};
pub use engine::{Engine, ShellEscape, UnsupportedEngine};
pub use error::{Category, RenderError};
pub use identifier::{Identifier, IdentifierHasher, InvalidIdentifier};
