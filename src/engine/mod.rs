mod availability;
pub(crate) mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{SlotQuery, compute_slots};
pub use error::{EngineError, Missing};

use std::sync::Arc;

use ulid::Ulid;

use crate::calendar::{Clock, LocalCalendar, SystemClock};
use crate::confirmation::ConfirmationDispatcher;
use crate::model::*;
use crate::ports::*;

/// The scheduling core: availability, booking and cancellation over injected
/// stores. Every operation is synchronous and safe to call from many threads.
pub struct Scheduler {
    pub(super) appointments: Arc<dyn AppointmentStore>,
    pub(super) schedules: Arc<dyn WorkScheduleStore>,
    pub(super) services: Arc<dyn ServiceCatalog>,
    pub(super) providers: Arc<dyn ProviderDirectory>,
    pub(super) confirmations: Option<ConfirmationDispatcher>,
    pub(super) calendar: LocalCalendar,
    pub(super) clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(
        appointments: Arc<dyn AppointmentStore>,
        schedules: Arc<dyn WorkScheduleStore>,
        services: Arc<dyn ServiceCatalog>,
        providers: Arc<dyn ProviderDirectory>,
        calendar: LocalCalendar,
    ) -> Self {
        Self {
            appointments,
            schedules,
            services,
            providers,
            confirmations: None,
            calendar,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Queue a confirmation for every booking created from now on.
    pub fn with_confirmations(mut self, dispatcher: ConfirmationDispatcher) -> Self {
        self.confirmations = Some(dispatcher);
        self
    }

    pub fn calendar(&self) -> &LocalCalendar {
        &self.calendar
    }

    pub(super) fn now(&self) -> Ms {
        self.clock.now()
    }

    pub(super) fn service(&self, service_id: Ulid) -> Result<Service, EngineError> {
        self.services
            .get(service_id)?
            .ok_or(EngineError::NotFound(Missing::Service(service_id)))
    }

    /// Fetch and check ownership. Someone else's appointment is reported as
    /// missing rather than forbidden.
    pub(super) fn owned_appointment(&self, id: Ulid, provider_id: Ulid) -> Result<Appointment, EngineError> {
        match self.appointments.get(id)? {
            Some(a) if a.provider_id == provider_id => Ok(a),
            _ => Err(EngineError::NotFound(Missing::Appointment(id))),
        }
    }
}
