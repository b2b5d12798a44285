//! Route handlers for the admin and public listeners.

pub mod admin;
pub mod connect;
pub mod public;
