//! Write-ahead-logged in-memory appointment store.

mod calendar;

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::time::Instant;

use dashmap::DashMap;
use tracing::{debug, info};
use ulid::Ulid;

use crate::engine::conflict::first_overlap;
use crate::model::*;
use crate::notify::CalendarFeed;
use crate::observability;
use crate::ports::{AppointmentStore, StoreError};
use crate::wal::Wal;

use calendar::ProviderCalendar;

type SharedCalendar = Arc<Mutex<ProviderCalendar>>;

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &'static str) -> Result<MutexGuard<'a, T>, StoreError> {
    mutex.lock().map_err(|_| StoreError::Poisoned(what))
}

/// `AppointmentStore` over per-provider in-memory calendars, journaled to a WAL.
///
/// Every write takes the compaction gate shared, then the provider's calendar
/// mutex, then the journal mutex. The overlap check, the fsynced append and
/// the in-memory apply all happen under the calendar mutex, so two writers on
/// the same provider serialize and writers on different providers don't.
pub struct JournaledStore {
    calendars: DashMap<Ulid, SharedCalendar>,
    /// appointment id → provider id
    appointment_index: DashMap<Ulid, Ulid>,
    /// cancellation token → appointment id
    token_index: DashMap<String, Ulid>,
    wal: Mutex<Wal>,
    compaction_gate: RwLock<()>,
    feed: Arc<CalendarFeed>,
}

/// Apply an event to its provider's calendar. Caller holds the calendar.
fn apply_event(
    cal: &mut ProviderCalendar,
    event: &Event,
    appointment_index: &DashMap<Ulid, Ulid>,
    token_index: &DashMap<String, Ulid>,
) {
    match event {
        Event::AppointmentBooked { appointment } => {
            appointment_index.insert(appointment.id, appointment.provider_id);
            token_index.insert(appointment.cancellation_token.as_str().to_owned(), appointment.id);
            cal.insert(appointment.clone());
        }
        Event::AppointmentUpdated { appointment } => {
            cal.replace(appointment.clone());
        }
        Event::StatusChanged { id, status, .. } => {
            cal.set_status(*id, status.clone());
        }
    }
}

impl JournaledStore {
    /// Replay the journal at `path` and open it for appending.
    pub fn open(path: &Path, feed: Arc<CalendarFeed>) -> io::Result<Self> {
        let (wal, events) = Wal::open(path)?;

        let appointment_index = DashMap::new();
        let token_index = DashMap::new();
        let mut replayed: HashMap<Ulid, ProviderCalendar> = HashMap::new();
        for event in &events {
            let cal = replayed.entry(event.provider_id()).or_default();
            apply_event(cal, event, &appointment_index, &token_index);
        }

        let calendars = DashMap::new();
        for (provider_id, cal) in replayed {
            calendars.insert(provider_id, Arc::new(Mutex::new(cal)));
        }
        info!(
            path = %path.display(),
            events = events.len(),
            appointments = appointment_index.len(),
            "journal replayed"
        );

        Ok(Self {
            calendars,
            appointment_index,
            token_index,
            wal: Mutex::new(wal),
            compaction_gate: RwLock::new(()),
            feed,
        })
    }

    fn gate(&self) -> Result<RwLockReadGuard<'_, ()>, StoreError> {
        self.compaction_gate
            .read()
            .map_err(|_| StoreError::Poisoned("compaction gate"))
    }

    fn calendar(&self, provider_id: Ulid) -> SharedCalendar {
        self.calendars.entry(provider_id).or_default().value().clone()
    }

    fn existing_calendar(&self, provider_id: Ulid) -> Option<SharedCalendar> {
        self.calendars.get(&provider_id).map(|e| e.value().clone())
    }

    fn provider_of(&self, id: Ulid) -> Option<Ulid> {
        self.appointment_index.get(&id).map(|e| *e.value())
    }

    /// Journal append + apply + publish. Caller holds the gate and `cal`.
    fn persist_and_apply(&self, cal: &mut ProviderCalendar, event: &Event) -> Result<(), StoreError> {
        let started = Instant::now();
        lock(&self.wal, "journal")?.append(event)?;
        metrics::histogram!(observability::JOURNAL_APPEND_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        apply_event(cal, event, &self.appointment_index, &self.token_index);
        self.feed.send(event);
        Ok(())
    }

    pub fn appends_since_compact(&self) -> Result<u64, StoreError> {
        Ok(lock(&self.wal, "journal")?.appends_since_compact())
    }

    pub fn appointment_count(&self) -> usize {
        self.appointment_index.len()
    }

    /// Rewrite the journal to one `AppointmentBooked` per appointment, holding
    /// off all writers meanwhile. Returns the number of events written.
    pub fn compact(&self) -> Result<usize, StoreError> {
        let _exclusive = self
            .compaction_gate
            .write()
            .map_err(|_| StoreError::Poisoned("compaction gate"))?;

        let mut events = Vec::with_capacity(self.appointment_index.len());
        let calendars: Vec<SharedCalendar> = self.calendars.iter().map(|e| e.value().clone()).collect();
        for cal in calendars {
            let cal = lock(&cal, "calendar")?;
            events.extend(cal.iter().map(|a| Event::AppointmentBooked {
                appointment: a.clone(),
            }));
        }

        let mut wal = lock(&self.wal, "journal")?;
        wal.rewrite(&events)?;
        metrics::counter!(observability::COMPACTIONS_TOTAL).increment(1);
        debug!(events = events.len(), path = %wal.path().display(), "journal compacted");
        Ok(events.len())
    }
}

impl AppointmentStore for JournaledStore {
    fn list_confirmed_between(&self, provider_id: Ulid, window: Span) -> Result<Vec<Appointment>, StoreError> {
        let Some(cal) = self.existing_calendar(provider_id) else {
            return Ok(Vec::new());
        };
        let cal = lock(&cal, "calendar")?;
        Ok(cal
            .overlapping(&window)
            .filter(|a| a.status.is_confirmed())
            .cloned()
            .collect())
    }

    fn create_if_no_overlap(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let _gate = self.gate()?;
        let cal = self.calendar(appointment.provider_id);
        let mut cal = lock(&cal, "calendar")?;

        if let Some(conflicting) = first_overlap(cal.overlapping(&appointment.span), &appointment.span, None) {
            return Err(StoreError::Overlap(conflicting));
        }

        self.persist_and_apply(
            &mut cal,
            &Event::AppointmentBooked {
                appointment: appointment.clone(),
            },
        )?;
        Ok(appointment)
    }

    fn update_if_no_overlap(
        &self,
        id: Ulid,
        provider_id: Ulid,
        change: &AppointmentChange,
    ) -> Result<Appointment, StoreError> {
        let _gate = self.gate()?;
        // Appointments never change provider, so a mismatch is simply "not yours".
        if self.provider_of(id) != Some(provider_id) {
            return Err(StoreError::Missing(id));
        }
        let cal = self.calendar(provider_id);
        let mut cal = lock(&cal, "calendar")?;
        let current = cal.get(id).ok_or(StoreError::Missing(id))?;

        let next = change.merge(current);
        if change.reschedule.is_some()
            && next.status.is_confirmed()
            && let Some(conflicting) = first_overlap(cal.overlapping(&next.span), &next.span, Some(id))
        {
            return Err(StoreError::Overlap(conflicting));
        }

        self.persist_and_apply(
            &mut cal,
            &Event::AppointmentUpdated {
                appointment: next.clone(),
            },
        )?;
        Ok(next)
    }

    fn find_by_token(&self, token: &str) -> Result<Option<Appointment>, StoreError> {
        let Some(id) = self.token_index.get(token).map(|e| *e.value()) else {
            return Ok(None);
        };
        self.get(id)
    }

    fn set_status(&self, id: Ulid, status: AppointmentStatus) -> Result<StatusTransition, StoreError> {
        let _gate = self.gate()?;
        let provider_id = self.provider_of(id).ok_or(StoreError::Missing(id))?;
        let cal = self.calendar(provider_id);
        let mut cal = lock(&cal, "calendar")?;
        let current = cal.get(id).ok_or(StoreError::Missing(id))?;
        let previous = current.status.clone();

        // Same status: nothing to journal.
        if previous == status {
            return Ok(StatusTransition {
                appointment: current.clone(),
                previous,
            });
        }

        let event = Event::StatusChanged {
            id,
            provider_id,
            status,
        };
        self.persist_and_apply(&mut cal, &event)?;
        let appointment = cal.get(id).cloned().ok_or(StoreError::Missing(id))?;
        Ok(StatusTransition { appointment, previous })
    }

    fn get(&self, id: Ulid) -> Result<Option<Appointment>, StoreError> {
        let Some(provider_id) = self.provider_of(id) else {
            return Ok(None);
        };
        let Some(cal) = self.existing_calendar(provider_id) else {
            return Ok(None);
        };
        let cal = lock(&cal, "calendar")?;
        Ok(cal.get(id).cloned())
    }
}
