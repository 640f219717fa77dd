//! HTTP shell around the QA service

pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

pub use handlers::AppState;
pub use routes::api_routes;
pub use server::build_app;
pub use server::serve_api;
