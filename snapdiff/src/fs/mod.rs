//! Filesystem side: crawling, metadata, scoped permissions.

pub mod metadata;
pub mod perms;
pub mod walker;
