pub mod broadcast;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use chrono::Duration;
use std::sync::Arc;
use tracing::{info, warn};

use broadcast::{Broadcaster, RedisBroadcaster, ViewerRegistry};
use catalog::{MemoryCatalog, PgCatalog, SeatCatalog};
use clock::{Clock, SystemClock};
use config::{Config, StoreBackend};
use services::{BookingEngine, LockService, ShowingGateway};
use store::{MemoryLedger, PgLedger, SeatLedger};

// Shared state для всего приложения
pub struct AppState {
    pub config: Config,
    pub catalog: Arc<dyn SeatCatalog>,
    pub ledger: Arc<dyn SeatLedger>,
    pub viewers: Arc<ViewerRegistry>,
    pub clock: Arc<dyn Clock>,
    pub locks: LockService,
    pub bookings: BookingEngine,
    pub seat_maps: ShowingGateway,
}

/// Готовые бэкенды, из которых собирается состояние.
pub struct Backends {
    pub catalog: Arc<dyn SeatCatalog>,
    pub ledger: Arc<dyn SeatLedger>,
    pub viewers: Arc<ViewerRegistry>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Поднимает бэкенды по конфигурации: Postgres или память, Redis по желанию.
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let viewers = Arc::new(ViewerRegistry::new(config.booking.viewer_buffer));

        let redis = match &config.redis.url {
            Some(url) => match redis_client::RedisClient::new(url).await {
                Ok(redis) => {
                    info!("Redis connected");
                    Some(redis)
                }
                Err(e) => {
                    warn!(error = %e, "Redis unavailable, running without cache and relay");
                    None
                }
            },
            None => None,
        };

        let (catalog, ledger): (Arc<dyn SeatCatalog>, Arc<dyn SeatLedger>) =
            match config.database.backend {
                StoreBackend::Postgres => {
                    let url = config
                        .database
                        .url
                        .as_deref()
                        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;
                    let db = database::Database::new(url, config.database.pool_size).await?;
                    info!("Database connected");
                    db.run_migrations().await?;

                    let catalog: Arc<dyn SeatCatalog> = Arc::new(PgCatalog::new(db.clone()));
                    let catalog: Arc<dyn SeatCatalog> = match &redis {
                        Some(redis) => Arc::new(cache::CacheService::new(
                            redis.clone(),
                            catalog,
                            config.redis.catalog_ttl_secs,
                        )),
                        None => catalog,
                    };
                    let ledger: Arc<dyn SeatLedger> = Arc::new(PgLedger::new(db));
                    (catalog, ledger)
                }
                StoreBackend::Memory => {
                    let memory = MemoryCatalog::new();
                    if config.booking.seed_demo_theater {
                        seed_demo(&memory).await;
                    }
                    let catalog: Arc<dyn SeatCatalog> = Arc::new(memory);
                    let ledger: Arc<dyn SeatLedger> = Arc::new(MemoryLedger::new());
                    (catalog, ledger)
                }
            };

        let broadcaster: Arc<dyn Broadcaster> = match redis {
            Some(redis) => Arc::new(RedisBroadcaster::spawn(redis, viewers.clone())),
            None => viewers.clone(),
        };

        let backends = Backends {
            catalog,
            ledger,
            viewers,
            broadcaster,
            clock: Arc::new(SystemClock),
        };
        Ok(Arc::new(Self::from_backends(config, backends)))
    }

    pub fn from_backends(config: Config, backends: Backends) -> Self {
        let Backends { catalog, ledger, viewers, broadcaster, clock } = backends;
        let ttl = Duration::seconds(config.booking.lock_ttl_secs as i64);

        let locks = LockService::new(
            catalog.clone(),
            ledger.clone(),
            broadcaster.clone(),
            clock.clone(),
            ttl,
        );
        let bookings =
            BookingEngine::new(catalog.clone(), ledger.clone(), broadcaster, clock.clone());
        let seat_maps = ShowingGateway::new(catalog.clone(), ledger.clone(), clock.clone());

        Self { config, catalog, ledger, viewers, clock, locks, bookings, seat_maps }
    }

    /// Всё в памяти, рассылка только локальным зрителям.
    pub fn in_memory(config: Config, catalog: Arc<MemoryCatalog>, clock: Arc<dyn Clock>) -> Self {
        let viewers = Arc::new(ViewerRegistry::new(config.booking.viewer_buffer));
        let backends = Backends {
            catalog,
            ledger: Arc::new(MemoryLedger::new()),
            broadcaster: viewers.clone(),
            viewers,
            clock,
        };
        Self::from_backends(config, backends)
    }
}

async fn seed_demo(catalog: &MemoryCatalog) {
    let (theater, seats) = catalog.seed_theater("Demo Cinema", "Main street 1", 8, 12).await;
    let showing = catalog
        .seed_showing(theater.id, chrono::Utc::now() + Duration::hours(2), Duration::hours(2))
        .await;
    info!(
        theater_id = %theater.id,
        showing_id = %showing.id,
        seats = seats.len(),
        "demo theater seeded"
    );
}
