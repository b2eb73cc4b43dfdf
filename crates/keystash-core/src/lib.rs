//! Core abstractions for keystash: the secret-store contract, its error
//! taxonomy and the closure-based adapter used to assemble backends.
//! Backends live in `keystash-storage`; nothing here touches the platform.

pub mod storage;
