//! In-memory providers, services and weekly work blocks.

use chrono::NaiveTime;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::ports::{ProviderDirectory, ServiceCatalog, StoreError, WorkScheduleStore};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("name must be 1..={MAX_NAME_LEN} characters")]
    Name,
    #[error("duration {0} minutes outside {MIN_SERVICE_MINUTES}..={MAX_SERVICE_MINUTES}")]
    Duration(u32),
    #[error("weekday {0} outside 0..=6")]
    Weekday(u8),
    #[error("work block must start before it ends ({start} >= {end})")]
    EmptyBlock { start: NaiveTime, end: NaiveTime },
    #[error("unknown provider {0}")]
    UnknownProvider(Ulid),
    #[error("no work block for provider {provider_id} on weekday {weekday}")]
    UnknownBlock { provider_id: Ulid, weekday: u8 },
}

fn validate_name(name: &str) -> Result<(), CatalogError> {
    let len = name.trim().chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(CatalogError::Name);
    }
    Ok(())
}

#[derive(Default)]
pub struct InMemoryCatalog {
    providers: DashMap<Ulid, Provider>,
    services: DashMap<Ulid, Service>,
    /// (provider id, weekday) → block. At most one block per weekday.
    blocks: DashMap<(Ulid, u8), WorkBlock>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_provider(&self, provider: Provider) -> Result<(), CatalogError> {
        validate_name(&provider.name)?;
        self.providers.insert(provider.id, provider);
        Ok(())
    }

    pub fn add_service(&self, service: Service) -> Result<(), CatalogError> {
        validate_name(&service.name)?;
        if !(MIN_SERVICE_MINUTES..=MAX_SERVICE_MINUTES).contains(&service.duration_minutes) {
            return Err(CatalogError::Duration(service.duration_minutes));
        }
        self.services.insert(service.id, service);
        Ok(())
    }

    /// Set the provider's hours for `block.weekday`, replacing any earlier block.
    pub fn set_work_block(&self, block: WorkBlock) -> Result<(), CatalogError> {
        if block.weekday > 6 {
            return Err(CatalogError::Weekday(block.weekday));
        }
        if block.start >= block.end {
            return Err(CatalogError::EmptyBlock {
                start: block.start,
                end: block.end,
            });
        }
        if !self.providers.contains_key(&block.provider_id) {
            return Err(CatalogError::UnknownProvider(block.provider_id));
        }
        debug!(
            provider_id = %block.provider_id,
            weekday = block.weekday,
            start = %block.start,
            end = %block.end,
            "work block set"
        );
        self.blocks.insert((block.provider_id, block.weekday), block);
        Ok(())
    }

    /// Keep the block on record but stop offering slots from it.
    pub fn deactivate_block(&self, provider_id: Ulid, weekday: u8) -> Result<(), CatalogError> {
        let mut block = self
            .blocks
            .get_mut(&(provider_id, weekday))
            .ok_or(CatalogError::UnknownBlock { provider_id, weekday })?;
        block.active = false;
        Ok(())
    }
}

impl WorkScheduleStore for InMemoryCatalog {
    fn active_block(&self, provider_id: Ulid, weekday: u8) -> Result<Option<WorkBlock>, StoreError> {
        Ok(self
            .blocks
            .get(&(provider_id, weekday))
            .filter(|b| b.active)
            .map(|b| b.value().clone()))
    }
}

impl ServiceCatalog for InMemoryCatalog {
    fn get(&self, service_id: Ulid) -> Result<Option<Service>, StoreError> {
        Ok(self.services.get(&service_id).map(|s| s.value().clone()))
    }
}

impl ProviderDirectory for InMemoryCatalog {
    fn find(&self, provider_id: Ulid) -> Result<Option<Provider>, StoreError> {
        Ok(self.providers.get(&provider_id).map(|p| p.value().clone()))
    }
}
