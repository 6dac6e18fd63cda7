//! HTTP API handlers for replyq-server

pub mod health;
pub mod jobs;
pub mod sse;
pub mod webhooks;

pub use health::health_routes;
pub use jobs::job_routes;
pub use sse::event_stream;
pub use webhooks::webhook_routes;
