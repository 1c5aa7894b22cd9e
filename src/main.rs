mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderName, Method,
};
use config::Config;
use dotenv::dotenv;
use redis::aio::ConnectionManager;
use routes::create_router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use crate::{
    db::{db::DBClient, memory::MemoryStore, Store},
    service::{
        admin_service::AdminService, bulk_service::BulkService, department_service::DepartmentService,
        ticket_service::TicketService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub env: Config,
    pub store: Arc<dyn Store>,
    pub redis: Option<Arc<ConnectionManager>>,
    // Services
    pub ticket_service: Arc<TicketService>,
    pub bulk_service: Arc<BulkService>,
    pub admin_service: Arc<AdminService>,
    pub department_service: Arc<DepartmentService>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>, redis: Option<Arc<ConnectionManager>>) -> Self {
        let ticket_service = TicketService::new(store.clone(), config.sla.clone(), config.tickets.clone());
        let bulk_service = Arc::new(BulkService::new(ticket_service.clone()));
        let admin_service = Arc::new(AdminService::new(store.clone()));
        let department_service = Arc::new(DepartmentService::new(store.clone()));

        Self {
            env: config,
            store,
            redis,
            ticket_service: Arc::new(ticket_service),
            bulk_service,
            admin_service,
            department_service,
        }
    }
}

/// Postgres when `DATABASE_URL` is set, the in-memory store otherwise.
async fn connect_store(config: &Config) -> (Arc<dyn Store>, Option<Arc<ConnectionManager>>) {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set - using the in-memory store, data is lost on restart");
        return (Arc::new(MemoryStore::new()), None);
    };

    let pool = match PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Connection to the database is successful");
            pool
        }
        Err(err) => {
            tracing::error!("Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    let db_client = match config.redis_url.as_deref() {
        Some(redis_url) => DBClient::with_redis(pool, redis_url).await,
        None => {
            tracing::info!("Redis not configured - running without stats cache");
            DBClient::new(pool)
        }
    };

    if let Err(err) = db_client.run_migrations().await {
        tracing::error!("Failed to run migrations: {}", err);
        std::process::exit(1);
    }

    tracing::info!("Cache status: {}", db_client.cache_status());
    let redis = db_client.redis_client.clone();
    (Arc::new(db_client), redis)
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = Config::init();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .init();

    let (store, redis) = connect_store(&config).await;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([
            AUTHORIZATION,
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static(middleware::TENANT_HEADER),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::PATCH]);

    let app_state = Arc::new(AppState::new(config.clone(), store, redis));

    let app = create_router(app_state.clone()).layer(cors);

    let app_state_clone = app_state.clone();
    tokio::spawn(async move {
        service::background_jobs::start_sla_breach_job(app_state_clone).await;
    });

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", &config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    tracing::info!("Server is running on http://localhost:{}", config.port);

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", err);
    }
}
