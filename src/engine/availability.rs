use crate::calendar::LocalCalendar;
use crate::model::*;

use super::conflict::first_overlap;

// ── Slot Generation ───────────────────────────────────────────────

/// Inputs of one slot computation, all resolved to instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotQuery {
    /// Local calendar day; granularity boundaries are counted from its start.
    pub day: Span,
    /// The work block on that day.
    pub block: Span,
    pub duration_ms: Ms,
    /// Only slots starting strictly after this instant are offered.
    pub not_before: Ms,
}

/// Candidate slots for one provider-day.
///
/// Starts step by the calendar granularity from the block start (rounded up to
/// a boundary) while the slot still ends inside the block. A candidate is
/// dropped if it overlaps any confirmed appointment or does not start after
/// `not_before`. Output is chronological.
pub fn compute_slots(calendar: &LocalCalendar, query: &SlotQuery, booked: &[Appointment]) -> Vec<Span> {
    let step = calendar.granularity_ms();
    if query.duration_ms <= 0 {
        return Vec::new();
    }

    let mut slots = Vec::new();
    let mut start = calendar.align_up(query.block.start, query.day.start);
    while start + query.duration_ms <= query.block.end {
        let candidate = Span::new(start, start + query.duration_ms);
        if candidate.start > query.not_before && first_overlap(booked, &candidate, None).is_none() {
            slots.push(candidate);
        }
        start += step;
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::appointment;
    use ulid::Ulid;

    const M: Ms = MINUTE_MS;
    const H: Ms = 60 * M;
    /// 2030-01-07T00:00:00Z, a Monday.
    const DAY: Ms = 1_893_974_400_000;

    fn calendar() -> LocalCalendar {
        LocalCalendar::utc(15).unwrap()
    }

    fn query(block: Span, minutes: Ms) -> SlotQuery {
        SlotQuery {
            day: Span::new(DAY, DAY + 24 * H),
            block,
            duration_ms: minutes * M,
            not_before: 0,
        }
    }

    fn labels(slots: &[Span]) -> Vec<String> {
        let cal = calendar();
        slots.iter().map(|s| cal.format_time_of_day(s.start)).collect()
    }

    #[test]
    fn empty_calendar_fills_block() {
        let block = Span::new(DAY + 9 * H, DAY + 10 * H);
        let slots = compute_slots(&calendar(), &query(block, 30), &[]);
        assert_eq!(labels(&slots), ["09:00", "09:15", "09:30"]);
        assert!(slots.iter().all(|s| block.contains_span(s)));
    }

    #[test]
    fn booking_punches_hole() {
        let block = Span::new(DAY + 9 * H, DAY + 13 * H);
        let booked = [appointment(Ulid::new(), Span::new(DAY + 10 * H, DAY + 10 * H + 30 * M))];
        let slots = compute_slots(&calendar(), &query(block, 30), &booked);
        assert_eq!(
            labels(&slots),
            [
                "09:00", "09:15", "09:30", "10:30", "10:45", "11:00", "11:15", "11:30", "11:45",
                "12:00", "12:15", "12:30",
            ]
        );
    }

    #[test]
    fn duration_longer_than_block_yields_nothing() {
        let block = Span::new(DAY + 9 * H, DAY + 10 * H);
        assert!(compute_slots(&calendar(), &query(block, 61), &[]).is_empty());
    }

    #[test]
    fn exact_fit_yields_single_slot() {
        let block = Span::new(DAY + 9 * H, DAY + 10 * H);
        let slots = compute_slots(&calendar(), &query(block, 60), &[]);
        assert_eq!(slots, vec![Span::new(DAY + 9 * H, DAY + 10 * H)]);
    }

    #[test]
    fn unaligned_block_start_rounds_up() {
        let block = Span::new(DAY + 9 * H + 10 * M, DAY + 10 * H);
        let slots = compute_slots(&calendar(), &query(block, 20), &[]);
        assert_eq!(labels(&slots), ["09:15", "09:30"]);
    }

    #[test]
    fn short_service_still_steps_by_granularity() {
        let block = Span::new(DAY + 9 * H, DAY + 9 * H + 30 * M);
        let slots = compute_slots(&calendar(), &query(block, 5), &[]);
        assert_eq!(labels(&slots), ["09:00", "09:15"]);
    }

    #[test]
    fn touching_bookings_leave_adjacent_slots() {
        let block = Span::new(DAY + 9 * H, DAY + 11 * H + 15 * M);
        let booked = [appointment(Ulid::new(), Span::new(DAY + 10 * H, DAY + 10 * H + 15 * M))];
        let slots = compute_slots(&calendar(), &query(block, 60), &booked);
        // 09:00 ends exactly where the booking starts; 10:15 starts where it ends.
        assert_eq!(labels(&slots), ["09:00", "10:15"]);
    }

    #[test]
    fn not_before_drops_past_and_running_slots() {
        let block = Span::new(DAY + 9 * H, DAY + 11 * H);
        let mut q = query(block, 30);
        q.not_before = DAY + 9 * H + 15 * M; // exactly 09:15
        let slots = compute_slots(&calendar(), &q, &[]);
        assert_eq!(labels(&slots).first().map(String::as_str), Some("09:30"));
    }

    #[test]
    fn cancelled_bookings_do_not_block() {
        let block = Span::new(DAY + 9 * H, DAY + 10 * H);
        let mut cancelled = appointment(Ulid::new(), Span::new(DAY + 9 * H, DAY + 10 * H));
        cancelled.status = AppointmentStatus::Cancelled;
        let slots = compute_slots(&calendar(), &query(block, 30), &[cancelled]);
        assert_eq!(slots.len(), 3);
    }

    #[test]
    fn every_slot_is_aligned_and_free() {
        let block = Span::new(DAY + 8 * H, DAY + 18 * H);
        let booked = [
            appointment(Ulid::new(), Span::new(DAY + 9 * H + 5 * M, DAY + 9 * H + 50 * M)),
            appointment(Ulid::new(), Span::new(DAY + 13 * H, DAY + 14 * H + 15 * M)),
        ];
        let cal = calendar();
        for minutes in [5, 20, 30, 45, 90, 240] {
            for slot in compute_slots(&cal, &query(block, minutes), &booked) {
                assert!(cal.is_aligned(slot.start));
                assert!(slot.end <= block.end);
                assert!(booked.iter().all(|b| !b.span.overlaps(&slot)));
            }
        }
    }
}
