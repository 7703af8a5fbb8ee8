use std::sync::Arc;

use crate::{catalog::SeatCatalog, redis_client::RedisClient};

pub mod seats;

/// Read-through кеш каталога в Redis. Места зала неизменны, поэтому
/// кешируются надолго; сеансы не кешируются, у них меняется `is_active`.
#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    inner: Arc<dyn SeatCatalog>,
    ttl_secs: u64,
}

impl CacheService {
    pub fn new(redis: RedisClient, inner: Arc<dyn SeatCatalog>, ttl_secs: u64) -> Self {
        Self { redis, inner, ttl_secs }
    }
}
