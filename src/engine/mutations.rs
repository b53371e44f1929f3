use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::ports::StoreError;

use super::conflict::*;
use super::{EngineError, Missing, Scheduler};

/// Count a failed operation by kind and pass the result through.
pub(super) fn observe<T>(op: &'static str, result: Result<T, EngineError>) -> Result<T, EngineError> {
    if let Err(ref e) = result {
        metrics::counter!(observability::ERRORS_TOTAL, "op" => op, "kind" => e.kind()).increment(1);
        if matches!(e, EngineError::Conflict { .. }) {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
        }
        debug!(op, error = %e, "operation failed");
    }
    result
}

impl Scheduler {
    /// Book `request.start` for the provider.
    ///
    /// Everything about the request is validated before any store is touched.
    /// The overlap check and the insert are a single store operation, so of two
    /// concurrent overlapping requests at most one succeeds; the loser gets
    /// `Conflict` and should re-query availability before trying again.
    pub fn create_appointment(&self, request: BookingRequest) -> Result<Appointment, EngineError> {
        observe("create", self.create_inner(request))
    }

    fn create_inner(&self, request: BookingRequest) -> Result<Appointment, EngineError> {
        let now = self.now();
        validate_customer(&request.customer)?;
        validate_start(&self.calendar, request.start, now)?;

        match self.providers.find(request.provider_id)? {
            Some(p) if p.active => {}
            _ => return Err(EngineError::NotFound(Missing::Provider(request.provider_id))),
        }
        let service = self.service(request.service_id)?;
        validate_duration(service.duration_minutes)?;

        let span = Span::starting_at(request.start, service.duration_minutes);
        let appointment = Appointment {
            id: Ulid::new(),
            provider_id: request.provider_id,
            service_id: service.id,
            span,
            customer: request.customer,
            status: AppointmentStatus::Confirmed,
            cancellation_token: CancellationToken::generate(),
            created_at: now,
        };

        let appointment = match self.appointments.create_if_no_overlap(appointment) {
            Ok(a) => a,
            Err(StoreError::Overlap(conflicting)) => {
                return Err(EngineError::Conflict {
                    provider_id: request.provider_id,
                    requested: span,
                    conflicting,
                });
            }
            Err(e) => return Err(e.into()),
        };

        metrics::counter!(observability::BOOKINGS_TOTAL).increment(1);
        info!(
            appointment_id = %appointment.id,
            provider_id = %appointment.provider_id,
            service_id = %appointment.service_id,
            span = %appointment.span,
            "appointment booked"
        );
        if let Some(ref dispatcher) = self.confirmations {
            dispatcher.dispatch(&appointment);
        }
        Ok(appointment)
    }

    /// Partial update by the owning provider. Changing the service or the
    /// start recomputes the end from the service duration and re-checks
    /// overlap against everything but the appointment itself.
    pub fn update_appointment(
        &self,
        id: Ulid,
        provider_id: Ulid,
        patch: AppointmentPatch,
    ) -> Result<Appointment, EngineError> {
        observe("update", self.update_inner(id, provider_id, patch))
    }

    fn update_inner(&self, id: Ulid, provider_id: Ulid, patch: AppointmentPatch) -> Result<Appointment, EngineError> {
        if patch.is_empty() {
            return Err(EngineError::invalid("nothing to update"));
        }
        validate_patch_fields(&patch)?;
        if let Some(start) = patch.start {
            validate_start(&self.calendar, start, self.now())?;
        }

        let current = self.owned_appointment(id, provider_id)?;

        let reschedule = if patch.touches_schedule() {
            let service = self.service(patch.service_id.unwrap_or(current.service_id))?;
            validate_duration(service.duration_minutes)?;
            let start = patch.start.unwrap_or(current.span.start);
            Some(Reschedule {
                service_id: service.id,
                span: Span::starting_at(start, service.duration_minutes),
            })
        } else {
            None
        };

        let change = AppointmentChange {
            reschedule,
            customer_name: patch.customer_name,
            customer_email: patch.customer_email,
            customer_phone: patch.customer_phone,
        };

        let updated = match self.appointments.update_if_no_overlap(id, provider_id, &change) {
            Ok(a) => a,
            Err(StoreError::Overlap(conflicting)) => {
                return Err(EngineError::Conflict {
                    provider_id,
                    requested: reschedule.map_or(current.span, |r| r.span),
                    conflicting,
                });
            }
            Err(StoreError::Missing(_)) => return Err(EngineError::NotFound(Missing::Appointment(id))),
            Err(e) => return Err(e.into()),
        };

        let rescheduled = if reschedule.is_some() { "true" } else { "false" };
        metrics::counter!(observability::UPDATES_TOTAL, "rescheduled" => rescheduled).increment(1);
        info!(appointment_id = %id, provider_id = %provider_id, span = %updated.span, "appointment updated");
        Ok(updated)
    }

    /// Customer self-service cancellation. Cancelling twice is not an error;
    /// the second call reports `already_cancelled`.
    pub fn cancel_by_token(&self, token: &str) -> Result<CancelOutcome, EngineError> {
        observe("cancel_by_token", self.cancel_by_token_inner(token))
    }

    fn cancel_by_token_inner(&self, token: &str) -> Result<CancelOutcome, EngineError> {
        validate_token(token)?;
        let appointment = self
            .appointments
            .find_by_token(token)?
            .ok_or(EngineError::NotFound(Missing::CancellationToken))?;

        match appointment.status {
            AppointmentStatus::Cancelled => return Ok(already_cancelled()),
            AppointmentStatus::Other(ref status) => {
                return Err(EngineError::invalid(format!(
                    "an appointment in status {status} cannot be cancelled"
                )));
            }
            AppointmentStatus::Confirmed => {}
        }

        let transition = match self.appointments.set_status(appointment.id, AppointmentStatus::Cancelled) {
            Ok(t) => t,
            Err(StoreError::Missing(_)) => return Err(EngineError::NotFound(Missing::CancellationToken)),
            Err(e) => return Err(e.into()),
        };
        // A concurrent cancel may have won between the read and the write.
        if transition.previous == AppointmentStatus::Cancelled {
            return Ok(already_cancelled());
        }

        metrics::counter!(observability::CANCELLATIONS_TOTAL, "via" => "token", "outcome" => "cancelled")
            .increment(1);
        info!(appointment_id = %appointment.id, provider_id = %appointment.provider_id, "appointment cancelled by customer");
        Ok(CancelOutcome {
            message: "appointment cancelled".into(),
            already_cancelled: false,
        })
    }

    /// Provider-side cancellation by id. Idempotent; works from any status.
    pub fn cancel_appointment(&self, id: Ulid, provider_id: Ulid) -> Result<Appointment, EngineError> {
        observe("cancel", self.cancel_inner(id, provider_id))
    }

    fn cancel_inner(&self, id: Ulid, provider_id: Ulid) -> Result<Appointment, EngineError> {
        let current = self.owned_appointment(id, provider_id)?;
        if current.status == AppointmentStatus::Cancelled {
            metrics::counter!(observability::CANCELLATIONS_TOTAL, "via" => "provider", "outcome" => "already_cancelled")
                .increment(1);
            return Ok(current);
        }

        let transition = match self.appointments.set_status(id, AppointmentStatus::Cancelled) {
            Ok(t) => t,
            Err(StoreError::Missing(_)) => return Err(EngineError::NotFound(Missing::Appointment(id))),
            Err(e) => return Err(e.into()),
        };
        let outcome = if transition.previous == AppointmentStatus::Cancelled {
            "already_cancelled"
        } else {
            "cancelled"
        };
        metrics::counter!(observability::CANCELLATIONS_TOTAL, "via" => "provider", "outcome" => outcome)
            .increment(1);
        info!(appointment_id = %id, provider_id = %provider_id, previous = %transition.previous, "appointment cancelled by provider");
        Ok(transition.appointment)
    }
}

fn already_cancelled() -> CancelOutcome {
    metrics::counter!(observability::CANCELLATIONS_TOTAL, "via" => "token", "outcome" => "already_cancelled")
        .increment(1);
    CancelOutcome {
        message: "appointment was already cancelled".into(),
        already_cancelled: true,
    }
}
