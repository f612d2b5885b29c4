//! The per-job document staging model: working directories, strict file
//! admission, main-input resolution and result harvesting.

pub mod document;
pub mod stats;
pub mod workdir;

pub use document::{Document, FileWriter, StagedFile, MARK};
pub use stats::{FileCategory, InputStats};
pub use workdir::{InvalidJobDir, JobDir};
