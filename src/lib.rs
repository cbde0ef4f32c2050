pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod glucose;
pub mod models;
pub mod prediction;

pub use auth::{Auth0TokenSource, Credential, StaticToken, TokenSource};
pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::ApiError;
pub use glucose::GlucoseHistoryService;
pub use prediction::{PredictionOrchestrator, SubmissionState};
