//! Concrete secret-store backends and the resolver that picks one of them.
//! Platform facilities are probed in priority order; when none is usable the
//! file fallback is returned together with an advisory error.

pub mod config;
pub mod crypt;
pub mod file_store;
pub mod keychain;
pub mod keyctl;
pub mod process;
pub mod resolver;
pub mod secret_tool;

pub use resolver::{resolve, Resolution, Resolver};
