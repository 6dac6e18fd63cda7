//! Domain services for replyq-server
//!
//! Core workflow: ingestion → notification → conversation → posting, plus
//! the collaborator seams (review sources, reply generator, SMS gateway,
//! platform poster, billing portal) they are injected with.

pub mod billing;
pub mod command;
pub mod conversation;
pub mod gateway;
pub mod generator;
pub mod ingestion;
pub mod notifier;
pub mod platform;
pub mod poster;
pub mod rate_limit;
pub mod retry;
pub mod sentiment;
pub mod sources;

pub use conversation::ConversationStateMachine;
pub use ingestion::IngestionCoordinator;
pub use notifier::NotificationDispatcher;
pub use poster::ResponsePoster;
pub use retry::RetryScheduler;
pub use sentiment::SentimentClassifier;
