//! Wire-level abstraction of the assistant backend.
//!
//! This crate establishes the contract between the session layer and
//! whatever serves conversations: listing threads, loading history,
//! uploading attachments, deleting threads and streaming query answers.
//! The session layer only talks to these traits, so it can run against
//! the real HTTP backend as well as scripted fakes.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod backend;
mod error;
mod history;
mod request;
mod response;

pub use backend::*;
pub use error::*;
pub use history::*;
pub use request::*;
pub use response::*;
