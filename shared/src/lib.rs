//! Types shared between the arena server and its clients.

pub mod config;
pub mod protocol;
pub mod vec2;
