pub mod api;
pub mod config;
pub mod course_service;
pub mod database;
pub mod errors;
pub mod generation;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod providers;

pub use config::Config;
pub use course_service::CourseService;
pub use database::Database;
pub use errors::ApiError;
pub use generation::GenerationService;
pub use models::*;
pub use providers::{GeminiProvider, PerplexityProvider, ProviderError};
