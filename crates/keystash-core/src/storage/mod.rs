//! Secret-store contract shared by every backend.

mod adapter;
mod memory;
mod secret_store;

pub use adapter::FnSecretStore;
pub use memory::InMemorySecretStore;
pub use secret_store::{AppIdentity, BackendKind, Prerequisite, SecretStore, SecretStoreError};
