//! The dns module implements the DNS protocol and the related functions

pub mod buffer;
pub mod client;
pub mod context;
pub mod hosts;
pub mod name;
pub mod protocol;
pub mod server;
pub mod tracker;
