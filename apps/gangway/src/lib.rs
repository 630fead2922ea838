pub mod cluster;
pub mod config;
pub mod confirm;
pub mod crypto;
pub mod logging;
pub mod pty;
pub mod terminal;
