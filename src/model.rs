use std::fmt;

use chrono::NaiveTime;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::TOKEN_BYTES;

/// Unix milliseconds. The only instant type inside the core.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Span of `minutes` starting at `start`.
    pub fn starting_at(start: Ms, minutes: u32) -> Self {
        Self::new(start, start + Ms::from(minutes) * MINUTE_MS)
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// The overlap test shared by availability and booking. Touching endpoints
    /// do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A provider's declared working hours for one weekday (0 = Sunday).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkBlock {
    pub provider_id: Ulid,
    pub weekday: u8,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub name: String,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: Ulid,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
    /// Written by the surrounding system; not managed by the core.
    Other(String),
}

impl AppointmentStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, AppointmentStatus::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Confirmed => f.write_str("confirmed"),
            AppointmentStatus::Cancelled => f.write_str("cancelled"),
            AppointmentStatus::Other(s) => f.write_str(s),
        }
    }
}

/// Unguessable secret that authorises cancellation without a login.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CancellationToken(String);

impl CancellationToken {
    /// `TOKEN_BYTES` bytes from the thread-local CSPRNG, hex-encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let mut hex = String::with_capacity(TOKEN_BYTES * 2);
        for b in bytes {
            hex.push_str(&format!("{b:02x}"));
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CancellationToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// Keep tokens out of logs.
impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CancellationToken(..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub provider_id: Ulid,
    pub service_id: Ulid,
    pub span: Span,
    pub customer: Customer,
    pub status: AppointmentStatus,
    pub cancellation_token: CancellationToken,
    pub created_at: Ms,
}

/// Public booking request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub provider_id: Ulid,
    pub service_id: Ulid,
    pub start: Ms,
    pub customer: Customer,
}

/// Caller-facing partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentPatch {
    pub service_id: Option<Ulid>,
    pub start: Option<Ms>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

impl AppointmentPatch {
    pub fn is_empty(&self) -> bool {
        self.service_id.is_none()
            && self.start.is_none()
            && self.customer_name.is_none()
            && self.customer_email.is_none()
            && self.customer_phone.is_none()
    }

    pub fn touches_schedule(&self) -> bool {
        self.service_id.is_some() || self.start.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reschedule {
    pub service_id: Ulid,
    pub span: Span,
}

/// A patch with the schedule already resolved against the service catalog.
/// This is what a store applies atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentChange {
    pub reschedule: Option<Reschedule>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

impl AppointmentChange {
    pub fn merge(&self, current: &Appointment) -> Appointment {
        let mut next = current.clone();
        if let Some(r) = self.reschedule {
            next.service_id = r.service_id;
            next.span = r.span;
        }
        if let Some(ref name) = self.customer_name {
            next.customer.name = name.clone();
        }
        if let Some(ref email) = self.customer_email {
            next.customer.email = email.clone();
        }
        if let Some(ref phone) = self.customer_phone {
            next.customer.phone = phone.clone();
        }
        next
    }
}

/// Result of a status write: the stored record plus what it replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub appointment: Appointment,
    pub previous: AppointmentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    pub message: String,
    pub already_cancelled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderStats {
    pub today: usize,
    pub week: usize,
    pub month: usize,
    pub total: usize,
}

/// Journal record format, one variant per committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AppointmentBooked {
        appointment: Appointment,
    },
    AppointmentUpdated {
        appointment: Appointment,
    },
    StatusChanged {
        id: Ulid,
        provider_id: Ulid,
        status: AppointmentStatus,
    },
}

impl Event {
    pub fn provider_id(&self) -> Ulid {
        match self {
            Event::AppointmentBooked { appointment } | Event::AppointmentUpdated { appointment } => {
                appointment.provider_id
            }
            Event::StatusChanged { provider_id, .. } => *provider_id,
        }
    }
}
