//! Policy copying and payload sanitising

pub mod copier;
pub mod sanitize;

pub use copier::{copy_policy, PolicyDraft};
pub use sanitize::{prune, sanitize};
