use crate::model::Ms;

pub const DEFAULT_GRANULARITY_MINUTES: u32 = 15;

pub const MIN_SERVICE_MINUTES: u32 = 5;
pub const MAX_SERVICE_MINUTES: u32 = 240;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

pub const MAX_CUSTOMER_FIELD_LEN: usize = 200;
pub const MAX_NAME_LEN: usize = 100;

/// Random bytes per cancellation token (256 bits).
pub const TOKEN_BYTES: usize = 32;
pub const MAX_TOKEN_LEN: usize = 128;

/// Largest journal payload; a bigger length prefix is treated as corruption.
pub const MAX_JOURNAL_ENTRY_BYTES: usize = 64 * 1024;

/// 92 days.
pub const MAX_AGENDA_WINDOW_MS: Ms = 92 * 24 * 3_600_000;

/// ±14h covers every real-world UTC offset.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;
