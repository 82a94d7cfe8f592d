//! xtralab - xtrabackup chains against a backup catalog
//!
//! Produces full and incremental xtrabackup streams into a backup catalog
//! and reconstructs restorable workspaces from the catalog's chains.

pub mod backup;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod restore;
pub mod unpack;
