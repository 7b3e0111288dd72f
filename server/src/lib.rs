//! Growth-arena server library.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod collision;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod food;
pub mod game_loop;
pub mod gateway;
pub mod movement;
pub mod player;
pub mod rate_limit;
pub mod session;
pub mod state;
pub mod status;
pub mod ws;
