//! Configuration management for GeForce Eternity
//!
//! - **settings**: the flat [`Configuration`] record and its field-level validation
//! - **store**: [`ConfigStore`], the single owner of the record and its JSON file

pub mod settings;
pub mod store;

pub use settings::{ConfigField, Configuration, TypeMismatch};
pub use store::ConfigStore;
