use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use std::time::Duration;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod export;
mod model;
mod models;
mod routes;
mod staffing;
mod utils;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::routes::Limiters;
use crate::utils::cache::{ShiftCache, warmup_shift_cache};
use tracing::{error, info};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "crewsched.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!(addr = %config.server_addr, prefix = %config.api_prefix, "Server starting...");

    let pool = init_db(&config).await?;
    let cache = ShiftCache::new(
        config.shift_cache_capacity,
        Duration::from_secs(config.shift_cache_ttl_secs),
    );
    let limiters = Limiters::from_config(&config)?;

    let pool_for_warmup = pool.clone();
    let cache_for_warmup = cache.clone();
    actix_web::rt::spawn(async move {
        if let Err(e) = warmup_shift_cache(&pool_for_warmup, &cache_for_warmup).await {
            error!(error = ?e, "Failed to warm up shift cache");
        }
    });

    let server_addr = config.server_addr.clone();
    let openapi = ApiDoc::openapi();

    HttpServer::new(move || {
        let routes_config = config.clone();
        let limiters = limiters.clone();
        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard matches the JS/CSS assets
                    .url("/api-doc/openapi.json", openapi.clone()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(Data::new(cache.clone()))
            // Configure auth + protected routes with rate limiting
            .configure(move |cfg| routes::configure(cfg, &routes_config, limiters))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
