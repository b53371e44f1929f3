use ulid::Ulid;

use crate::calendar::LocalCalendar;
use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// First confirmed appointment in `appointments` overlapping `span`, skipping
/// `exclude`. Both the availability calculator and the store's authoritative
/// check go through here.
pub(crate) fn first_overlap<'a>(
    appointments: impl IntoIterator<Item = &'a Appointment>,
    span: &Span,
    exclude: Option<Ulid>,
) -> Option<Ulid> {
    appointments
        .into_iter()
        .filter(|a| a.status.is_confirmed() && Some(a.id) != exclude)
        .find(|a| a.span.overlaps(span))
        .map(|a| a.id)
}

pub(crate) fn validate_start(calendar: &LocalCalendar, start: Ms, now: Ms) -> Result<(), EngineError> {
    if !(MIN_VALID_TIMESTAMP_MS..MAX_VALID_TIMESTAMP_MS).contains(&start) {
        return Err(EngineError::invalid("start out of range"));
    }
    if !calendar.is_aligned(start) {
        return Err(EngineError::invalid(format!(
            "start must fall on a {}-minute boundary",
            calendar.granularity_minutes()
        )));
    }
    if start <= now {
        return Err(EngineError::invalid("start is in the past"));
    }
    Ok(())
}

pub(crate) fn validate_duration(minutes: u32) -> Result<(), EngineError> {
    if !(MIN_SERVICE_MINUTES..=MAX_SERVICE_MINUTES).contains(&minutes) {
        return Err(EngineError::invalid(format!(
            "duration must be between {MIN_SERVICE_MINUTES} and {MAX_SERVICE_MINUTES} minutes"
        )));
    }
    Ok(())
}

fn validate_field(field: &'static str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::invalid(format!("{field} is required")));
    }
    if value.len() > MAX_CUSTOMER_FIELD_LEN {
        return Err(EngineError::invalid(format!("{field} too long")));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), EngineError> {
    validate_field("customer_email", email)?;
    if !email.contains('@') {
        return Err(EngineError::invalid("customer_email is not an email address"));
    }
    Ok(())
}

pub(crate) fn validate_customer(customer: &Customer) -> Result<(), EngineError> {
    validate_field("customer_name", &customer.name)?;
    validate_email(&customer.email)?;
    validate_field("customer_phone", &customer.phone)
}

pub(crate) fn validate_patch_fields(patch: &AppointmentPatch) -> Result<(), EngineError> {
    if let Some(ref name) = patch.customer_name {
        validate_field("customer_name", name)?;
    }
    if let Some(ref email) = patch.customer_email {
        validate_email(email)?;
    }
    if let Some(ref phone) = patch.customer_phone {
        validate_field("customer_phone", phone)?;
    }
    Ok(())
}

pub(crate) fn validate_token(token: &str) -> Result<(), EngineError> {
    if token.trim().is_empty() {
        return Err(EngineError::invalid("cancellation token is required"));
    }
    if token.len() > MAX_TOKEN_LEN {
        return Err(EngineError::invalid("cancellation token too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;

    const M: Ms = MINUTE_MS;

    #[test]
    fn first_overlap_ignores_touching_and_cancelled() {
        let provider = Ulid::new();
        let booked = appointment(provider, Span::new(60 * M, 90 * M));
        let mut cancelled = appointment(provider, Span::new(120 * M, 150 * M));
        cancelled.status = AppointmentStatus::Cancelled;
        let all = [booked.clone(), cancelled];

        // ends exactly at the booking's start
        assert_eq!(first_overlap(&all, &Span::new(30 * M, 60 * M), None), None);
        // starts exactly at the booking's end
        assert_eq!(first_overlap(&all, &Span::new(90 * M, 120 * M), None), None);
        assert_eq!(first_overlap(&all, &Span::new(75 * M, 105 * M), None), Some(booked.id));
        assert_eq!(first_overlap(&all, &Span::new(120 * M, 150 * M), None), None);
    }

    #[test]
    fn first_overlap_can_exclude_self() {
        let booked = appointment(Ulid::new(), Span::new(0, 30 * M));
        let all = [booked.clone()];
        assert_eq!(first_overlap(&all, &Span::new(15 * M, 45 * M), Some(booked.id)), None);
    }

    #[test]
    fn other_statuses_do_not_block() {
        let mut odd = appointment(Ulid::new(), Span::new(0, 30 * M));
        odd.status = AppointmentStatus::Other("no_show".into());
        assert_eq!(first_overlap(&[odd], &Span::new(0, 30 * M), None), None);
    }

    #[test]
    fn customer_validation() {
        assert!(validate_customer(&customer()).is_ok());

        let mut c = customer();
        c.name = "   ".into();
        assert!(matches!(validate_customer(&c), Err(EngineError::Validation(_))));

        let mut c = customer();
        c.email = "not-an-email".into();
        assert!(validate_customer(&c).is_err());

        let mut c = customer();
        c.phone = "9".repeat(MAX_CUSTOMER_FIELD_LEN + 1);
        assert!(validate_customer(&c).is_err());
    }

    #[test]
    fn start_validation() {
        let cal = LocalCalendar::utc(15).unwrap();
        let nine = 1_893_974_400_000 + 9 * 60 * M;
        assert!(validate_start(&cal, nine, nine - 1).is_ok());
        assert!(validate_start(&cal, nine + 10 * M, 0).is_err());
        assert!(validate_start(&cal, nine, nine).is_err());
        assert!(validate_start(&cal, 0, -1).is_err());
    }

    #[test]
    fn duration_bounds() {
        assert!(validate_duration(5).is_ok());
        assert!(validate_duration(240).is_ok());
        assert!(validate_duration(4).is_err());
        assert!(validate_duration(241).is_err());
    }

    #[test]
    fn token_shape() {
        assert!(validate_token("abc").is_ok());
        assert!(validate_token("").is_err());
        assert!(validate_token(&"a".repeat(MAX_TOKEN_LEN + 1)).is_err());
    }
}
