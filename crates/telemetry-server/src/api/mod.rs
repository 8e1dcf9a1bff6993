//! HTTP surface: route table, handlers, and the inbound body middleware.

pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::routes;
pub use server::ApiServer;
