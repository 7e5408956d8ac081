//! Infrastructure layer for the Conductor ensemble execution engine.
//!
//! Adapters implementing the application layer's ports: YAML parsing,
//! the built-in agent registry and resolver, webhook/email notification
//! dispatch, and host configuration loading.

pub mod agents;
pub mod config;
pub mod notifications;
pub mod parser;
pub mod registry;
pub mod resolver;

pub use config::{ConfigLoader, FileConfig};
pub use notifications::NotificationManager;
pub use parser::YamlEnsembleParser;
pub use registry::BuiltinRegistry;
pub use resolver::Resolver;
