pub mod config;
pub mod error;
pub mod db;
pub mod entities;
pub mod forms;
pub mod permissions;
pub mod relationships;
pub mod server;
pub mod service;
pub mod settings;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{PortalError, Result};
pub use entities::{Entity, EntityRef, EntityType};
pub use permissions::{Actor, Permission, PermissionSet};
pub use service::Portal;
