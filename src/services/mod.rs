pub mod ai_client;
pub mod auth_service;
pub mod credit_service;
pub mod identity_provider;
pub mod maintenance;
pub mod summarizer;
pub mod summary_service;
pub mod user_service;
