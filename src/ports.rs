//! Seams between the scheduling core and the storage it runs over.
//!
//! The core never owns a connection. Whoever hosts it hands in implementations
//! of these traits; [`crate::store::JournaledStore`] and
//! [`crate::catalog::InMemoryCatalog`] are the ones shipped with the crate.

use thiserror::Error;
use ulid::Ulid;

use crate::model::*;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The write would overlap a confirmed appointment of the same provider.
    #[error("overlaps appointment {0}")]
    Overlap(Ulid),
    #[error("appointment {0} not found")]
    Missing(Ulid),
    /// Timeouts, lost connections and the like.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("journal error: {0}")]
    Journal(#[from] std::io::Error),
    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),
}

pub trait WorkScheduleStore: Send + Sync {
    /// The active block for `weekday` (0 = Sunday), if the provider works that day.
    fn active_block(&self, provider_id: Ulid, weekday: u8) -> Result<Option<WorkBlock>, StoreError>;
}

pub trait ServiceCatalog: Send + Sync {
    fn get(&self, service_id: Ulid) -> Result<Option<Service>, StoreError>;
}

pub trait ProviderDirectory: Send + Sync {
    fn find(&self, provider_id: Ulid) -> Result<Option<Provider>, StoreError>;
}

pub trait AppointmentStore: Send + Sync {
    /// Confirmed appointments of `provider_id` overlapping `window`, ordered by start.
    fn list_confirmed_between(&self, provider_id: Ulid, window: Span) -> Result<Vec<Appointment>, StoreError>;

    /// Insert `appointment` unless it overlaps a confirmed appointment of the
    /// same provider. Check and insert are one atomic unit.
    fn create_if_no_overlap(&self, appointment: Appointment) -> Result<Appointment, StoreError>;

    /// Apply `change` to appointment `id` owned by `provider_id`. When the
    /// change reschedules a confirmed appointment the overlap check runs,
    /// excluding `id` itself, atomically with the write.
    fn update_if_no_overlap(
        &self,
        id: Ulid,
        provider_id: Ulid,
        change: &AppointmentChange,
    ) -> Result<Appointment, StoreError>;

    fn find_by_token(&self, token: &str) -> Result<Option<Appointment>, StoreError>;

    /// Unconditionally set the status, reporting the one it replaced.
    fn set_status(&self, id: Ulid, status: AppointmentStatus) -> Result<StatusTransition, StoreError>;

    fn get(&self, id: Ulid) -> Result<Option<Appointment>, StoreError>;
}
