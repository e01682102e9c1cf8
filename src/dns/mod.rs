//! Raw UDP DNS client for MX and A lookups.

pub mod message;
pub mod resolver;

pub use resolver::Resolver;
