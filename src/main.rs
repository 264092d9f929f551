mod config;
mod db;
mod error;
mod middleware;
mod migration;
mod models;
mod routes;
mod services;
mod utils;

#[cfg(test)]
mod test_support;

use actix_web::{middleware::Logger, web, App, HttpServer};
use std::io;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::services::ai_client::OpenAiProvider;
use crate::services::auth_service::AuthService;
use crate::services::identity_provider::{HostedIdentityProvider, IdentityProvider, NoIdentityProvider};
use crate::services::maintenance::MaintenanceService;
use crate::services::summarizer::Summarizer;
use crate::services::summary_service::SummaryService;
use crate::services::user_service::UserService;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    init_logging(config.json_logs);
    error::set_expose_details(config.expose_error_details);

    tracing::info!("Connecting to database");
    let db = db::establish_connection(&config.database_url)
        .await
        .map_err(|e| io::Error::other(format!("Database connection failed: {}", e)))?;
    tracing::info!("Database connected, migrations applied");

    let provider = OpenAiProvider::new(&config.ai).map_err(|e| io::Error::other(e.to_string()))?;
    let summarizer = Summarizer::new(Arc::new(provider), &config.ai);

    let identity: Arc<dyn IdentityProvider> = match config.identity.clone() {
        Some(settings) => {
            tracing::info!(url = %settings.url, "Federated identity enabled");
            Arc::new(HostedIdentityProvider::new(settings).map_err(|e| io::Error::other(e.to_string()))?)
        }
        None => {
            tracing::info!("Federated identity disabled, local accounts only");
            Arc::new(NoIdentityProvider)
        }
    };

    let summaries = web::Data::new(SummaryService::new(db.clone(), summarizer, &config));
    let auth = web::Data::new(AuthService::new(db.clone(), identity, &config));
    let users = web::Data::new(UserService::new(db.clone(), config.credits.clone()));

    MaintenanceService::spawn(db.clone(), config.clone());

    let bind_addr = (config.host.clone(), config.port);
    tracing::info!(host = %bind_addr.0, port = bind_addr.1, "Server listening");

    let db = web::Data::new(db);
    let shared_config = web::Data::new(config);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(db.clone())
            .app_data(shared_config.clone())
            .app_data(summaries.clone())
            .app_data(auth.clone())
            .app_data(users.clone())
            .configure(routes::configure_routes)
    })
    .bind(bind_addr)?
    .run()
    .await
}

/// Logs structurés: JSON en production, texte lisible en local
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("recap_api=debug,actix_web=info,info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false).flatten_event(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
