use tracing_subscriber::EnvFilter;

// ── Request metrics ─────────────────────────────────────────────

/// Counter: appointments created.
pub const BOOKINGS_TOTAL: &str = "barber_bookings_total";

/// Counter: create/update attempts rejected because the slot was taken.
pub const BOOKING_CONFLICTS_TOTAL: &str = "barber_booking_conflicts_total";

/// Counter: appointments updated. Labels: rescheduled.
pub const UPDATES_TOTAL: &str = "barber_updates_total";

/// Counter: cancellations. Labels: via (token, provider), outcome.
pub const CANCELLATIONS_TOTAL: &str = "barber_cancellations_total";

/// Counter: failed operations. Labels: op, kind.
pub const ERRORS_TOTAL: &str = "barber_errors_total";

/// Counter: availability computations.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "barber_availability_queries_total";

/// Histogram: slots returned per availability computation.
pub const AVAILABILITY_SLOTS: &str = "barber_availability_slots";

// ── Background work ─────────────────────────────────────────────

/// Counter: confirmation messages handed to the notifier. Labels: status.
pub const NOTIFICATIONS_TOTAL: &str = "barber_notifications_total";

/// Histogram: journal append + fsync duration in seconds.
pub const JOURNAL_APPEND_DURATION_SECONDS: &str = "barber_journal_append_duration_seconds";

/// Counter: journal compactions.
pub const COMPACTIONS_TOTAL: &str = "barber_compactions_total";

/// Install a `tracing` subscriber filtered by `filter` (`RUST_LOG` syntax).
/// Returns false if a global subscriber was already set.
pub fn init_tracing(filter: &str) -> bool {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok()
}
