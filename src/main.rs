// src/main.rs

use std::{sync::Arc, time::Duration};

use duel_server::{
    config::Config,
    routes,
    services::{
        CourseCatalog, QuestionGenerator, ResultSink, Services,
        catalog::{InMemoryCatalog, PgCourseCatalog},
        generator::{HttpQuestionGenerator, StaticQuestionGenerator},
        results::{MemoryResultSink, PgResultSink},
    },
    session::ChallengeHub,
    state::AppState,
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load configuration from environment (.env included)
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "duel.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let pool = match &config.database_url {
        Some(url) => Some(connect_database(url).await),
        None => {
            tracing::warn!("DATABASE_URL not set, running on in-memory catalog and results");
            None
        }
    };

    let services = build_services(&config, pool.clone());
    let hub = ChallengeHub::new(services, config.duel.clone());

    let state = AppState {
        hub,
        pool,
        config: config.clone(),
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    tracing::info!("Duel server listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind listening address");

    // Start the server
    axum::serve(listener, app).await.expect("Server error");
}

/// Connects with retry, then applies migrations.
async fn connect_database(url: &str) -> PgPool {
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };
    tracing::info!("Database connected...");

    tracing::info!("Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    pool
}

/// Picks the collaborator implementations the environment asks for.
fn build_services(config: &Config, pool: Option<PgPool>) -> Services {
    let (catalog, results): (Arc<dyn CourseCatalog>, Arc<dyn ResultSink>) = match pool {
        Some(pool) => (
            Arc::new(PgCourseCatalog::new(pool.clone())),
            Arc::new(PgResultSink::new(pool)),
        ),
        None => {
            let catalog = match &config.course_file {
                Some(path) => InMemoryCatalog::from_file(path)
                    .unwrap_or_else(|e| panic!("Failed to load courses from {}: {}", path, e)),
                None => InMemoryCatalog::default(),
            };
            (Arc::new(catalog), Arc::new(MemoryResultSink::default()))
        }
    };

    let generator: Arc<dyn QuestionGenerator> = match (&config.question_service_url, &config.question_bank_file) {
        (Some(url), _) => {
            tracing::info!("Generating questions through {}", url);
            Arc::new(
                HttpQuestionGenerator::new(url.clone(), config.question_service_key.clone())
                    .expect("Failed to build HTTP client"),
            )
        }
        (None, Some(path)) => Arc::new(
            StaticQuestionGenerator::from_file(path)
                .unwrap_or_else(|e| panic!("Failed to load question bank {}: {}", path, e)),
        ),
        (None, None) => {
            tracing::warn!("No question source configured; every duel will be cancelled");
            Arc::new(StaticQuestionGenerator::default())
        }
    };

    Services {
        catalog,
        generator,
        results,
    }
}
