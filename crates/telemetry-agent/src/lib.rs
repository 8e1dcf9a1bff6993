pub mod collector;
pub mod config;
pub mod crypto;
pub mod logging;
pub mod retry;
pub mod runtime;
pub mod transmitter;
