//! Port definitions (interfaces for external adapters).
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod agent_resolver;
pub mod ensemble_parser;
pub mod notification_sender;
