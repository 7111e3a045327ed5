//! An authoritative DNS server answering from a static host table.

pub mod dns;
