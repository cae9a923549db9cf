//! Types shared by the engagement client, the document store and its HTTP server.

pub mod domain;
pub mod error;
pub mod protocol;
