use chrono::NaiveDate;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::calendar::LocalCalendar;
use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::availability::{SlotQuery, compute_slots};
use super::conflict::validate_duration;
use super::mutations::observe;
use super::{EngineError, Scheduler};

impl Scheduler {
    /// Free slots of `duration_minutes` for the provider on local `date`.
    ///
    /// A day without an active work block yields no slots. Only slots starting
    /// strictly after now are offered, so past dates are always empty. The
    /// result is a snapshot: booking any of it can still fail with `Conflict`.
    pub fn available_slots(
        &self,
        provider_id: Ulid,
        date: NaiveDate,
        duration_minutes: u32,
    ) -> Result<Vec<Span>, EngineError> {
        observe("availability", self.available_slots_inner(provider_id, date, duration_minutes))
    }

    fn available_slots_inner(
        &self,
        provider_id: Ulid,
        date: NaiveDate,
        duration_minutes: u32,
    ) -> Result<Vec<Span>, EngineError> {
        validate_duration(duration_minutes)?;
        metrics::counter!(observability::AVAILABILITY_QUERIES_TOTAL).increment(1);

        let weekday = LocalCalendar::weekday(date);
        let Some(block) = self.schedules.active_block(provider_id, weekday)? else {
            debug!(%provider_id, %date, "no work block");
            return Ok(Vec::new());
        };
        if block.start >= block.end {
            warn!(%provider_id, weekday, "ignoring empty work block");
            return Ok(Vec::new());
        }

        let day = self.calendar.day_window(date);
        let booked = self.appointments.list_confirmed_between(provider_id, day)?;
        let query = SlotQuery {
            day,
            block: Span::new(self.calendar.at(date, block.start), self.calendar.at(date, block.end)),
            duration_ms: Ms::from(duration_minutes) * MINUTE_MS,
            not_before: self.now(),
        };
        let slots = compute_slots(&self.calendar, &query, &booked);
        metrics::histogram!(observability::AVAILABILITY_SLOTS).record(slots.len() as f64);
        Ok(slots)
    }

    /// Slot starts as local `HH:MM`, chronological.
    pub fn get_availability(
        &self,
        provider_id: Ulid,
        date: NaiveDate,
        duration_minutes: u32,
    ) -> Result<Vec<String>, EngineError> {
        let slots = self.available_slots(provider_id, date, duration_minutes)?;
        Ok(slots
            .iter()
            .map(|s| self.calendar.format_time_of_day(s.start))
            .collect())
    }

    /// `get_availability` with the duration taken from the service.
    pub fn availability_for_service(
        &self,
        provider_id: Ulid,
        date: NaiveDate,
        service_id: Ulid,
    ) -> Result<Vec<String>, EngineError> {
        let service = observe("availability", self.service(service_id))?;
        self.get_availability(provider_id, date, service.duration_minutes)
    }

    /// Confirmed appointments starting in `[from, to)`, ordered by start.
    pub fn agenda(&self, provider_id: Ulid, from: Ms, to: Ms) -> Result<Vec<Appointment>, EngineError> {
        observe("agenda", self.agenda_inner(provider_id, from, to))
    }

    fn agenda_inner(&self, provider_id: Ulid, from: Ms, to: Ms) -> Result<Vec<Appointment>, EngineError> {
        if from >= to {
            return Err(EngineError::invalid("agenda window must start before it ends"));
        }
        if to.checked_sub(from).is_none_or(|window| window > MAX_AGENDA_WINDOW_MS) {
            return Err(EngineError::invalid("agenda window longer than 92 days"));
        }
        let mut appointments = self
            .appointments
            .list_confirmed_between(provider_id, Span::new(from, to))?;
        appointments.retain(|a| a.span.start >= from);
        Ok(appointments)
    }

    /// Confirmed appointment counts: today, this week (from Monday), this
    /// month, and all time. Week and month include future bookings.
    pub fn provider_stats(&self, provider_id: Ulid) -> Result<ProviderStats, EngineError> {
        observe("stats", self.provider_stats_inner(provider_id))
    }

    fn provider_stats_inner(&self, provider_id: Ulid) -> Result<ProviderStats, EngineError> {
        let today = self.calendar.local_date(self.now());
        let day = self.calendar.day_window(today);
        let week_start = self.calendar.week_start(today);
        let month_start = self.calendar.month_start(today);

        let all = self.appointments.list_confirmed_between(
            provider_id,
            Span::new(MIN_VALID_TIMESTAMP_MS, MAX_VALID_TIMESTAMP_MS),
        )?;
        Ok(ProviderStats {
            today: all.iter().filter(|a| day.contains_instant(a.span.start)).count(),
            week: all.iter().filter(|a| a.span.start >= week_start).count(),
            month: all.iter().filter(|a| a.span.start >= month_start).count(),
            total: all.len(),
        })
    }
}
