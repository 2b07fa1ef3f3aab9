//! Administer Entra Conditional Access policies and named locations.
//!
//! The core (`directory`, `policy`, `location`, `geo_exception`, `actions`)
//! talks to Microsoft Graph only through [`graph::GraphService`], so it can
//! be driven by the real [`graph::GraphClient`] or by a test double.

pub mod actions;
pub mod cmd;
pub mod config;
pub mod directory;
pub mod error;
pub mod geo_exception;
pub mod graph;
pub mod location;
pub mod poll;
pub mod policy;
