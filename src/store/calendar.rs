use ulid::Ulid;

use crate::model::*;

/// One provider's appointments, kept sorted by start.
#[derive(Debug, Default)]
pub(crate) struct ProviderCalendar {
    appointments: Vec<Appointment>,
}

impl ProviderCalendar {
    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .binary_search_by_key(&appointment.span.start, |a| a.span.start)
            .unwrap_or_else(|e| e);
        self.appointments.insert(pos, appointment);
    }

    fn remove(&mut self, id: Ulid) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    /// Swap in a new version of an existing appointment, re-sorting if it moved.
    pub fn replace(&mut self, appointment: Appointment) -> Option<Appointment> {
        let previous = self.remove(appointment.id);
        self.insert(appointment);
        previous
    }

    pub fn get(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    /// Returns the status that was replaced.
    pub fn set_status(&mut self, id: Ulid, status: AppointmentStatus) -> Option<AppointmentStatus> {
        let appointment = self.appointments.iter_mut().find(|a| a.id == id)?;
        Some(std::mem::replace(&mut appointment.status, status))
    }

    /// Appointments of any status whose span overlaps `window`.
    pub fn overlapping(&self, window: &Span) -> impl Iterator<Item = &Appointment> {
        // Everything at index >= right_bound starts at or after window.end.
        let right_bound = self.appointments.partition_point(|a| a.span.start < window.end);
        self.appointments[..right_bound]
            .iter()
            .filter(move |a| a.span.end > window.start)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Appointment> {
        self.appointments.iter()
    }
}
