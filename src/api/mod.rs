//! HTTP surface: query gateway, OTLP receiver, middleware

pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;

pub use middleware::AllowedOrigins;
pub use server::{otlp_router, query_router, serve};
