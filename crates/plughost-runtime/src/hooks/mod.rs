//! Hook system: definitions, registry, catalog, and dispatcher.

pub mod catalog;
pub mod definitions;
pub mod dispatcher;
pub mod registry;
