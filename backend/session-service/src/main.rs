/// Session Service - HTTP Server
///
/// Admission control and membership/monetization ledgers for meetings and streams.
use actix_web::{middleware as actix_middleware, web, App, HttpServer};
use anyhow::{Context, Result};
use prometheus::Registry;
use session_cache::{CacheMetrics, RedisCacheBackend, SessionCache};
use session_service::config::StoreBackend;
use session_service::handlers::{self, AppState};
use session_service::services::Services;
use session_service::{logging, metrics, Config};
use session_store::{InMemoryStore, RedisStore, Store, StoreAdapter};
use std::sync::Arc;
use tracing::{info, warn};

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn build_store(config: &Config) -> Result<Store> {
    let adapter: Arc<dyn StoreAdapter> = match config.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory store; state is lost on restart");
            Arc::new(InMemoryStore::new())
        }
        StoreBackend::Redis => {
            let url = config
                .store
                .redis_url
                .as_deref()
                .context("STORE_REDIS_URL environment variable not set")?;
            let store = RedisStore::connect(url, config.store.key_prefix.clone())
                .await
                .context("Failed to connect to store")?;
            info!("Connected to Redis store");
            Arc::new(store)
        }
    };

    Ok(Store::new(
        adapter,
        config.store.timeout(),
        config.cas.retry_config(),
    ))
}

async fn build_cache(config: &Config) -> SessionCache {
    match &config.cache.redis_url {
        Some(url) => match RedisCacheBackend::connect(url).await {
            Ok(backend) => {
                info!("Connected to Redis cache");
                SessionCache::new(Arc::new(backend))
            }
            Err(e) => {
                warn!(error = %e, "Redis cache unavailable, running with in-process cache only");
                SessionCache::local_only()
            }
        },
        None => {
            info!("REDIS_URL not set, running with in-process cache only");
            SessionCache::local_only()
        }
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    logging::init_tracing(config.app.json_logs);

    info!(env = %config.app.env, "Starting session-service");

    let store = build_store(&config).await?;
    let cache = build_cache(&config).await;

    let registry = Registry::new();
    CacheMetrics::register(&registry).context("Failed to register cache metrics")?;
    metrics::register(&registry).context("Failed to register service metrics")?;

    let services = Services::new(store.clone(), cache, &config.session);
    let state = AppState {
        services,
        store,
        registry,
    };

    let bind_address = format!("{}:{}", config.app.host, config.app.http_port);
    info!(address = %bind_address, "HTTP server listening");

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(actix_middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .disable_signals()
    .run();

    let handle = server.handle();
    let mut server_task = actix_web::rt::spawn(server);

    tokio::select! {
        result = &mut server_task => {
            result
                .context("HTTP server task panicked")?
                .context("HTTP server failed")?;
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            handle.stop(true).await;
            server_task
                .await
                .context("HTTP server task panicked")?
                .context("HTTP server failed")?;
        }
    }

    info!("session-service stopped");
    Ok(())
}
