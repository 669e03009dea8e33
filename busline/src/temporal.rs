//! Temporal status engine.
//!
//! Pure derivations from a route's timetable, a bus's status and the current
//! local wall-clock time. Nothing here reads a clock or mutates shared state;
//! callers pass `now` in (see [`local_now`]).

use crate::types::{Bus, BusStatus, TimeOfDay, Ticket};
use busline_core::environment::RandomSource;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minutes added to the scheduled arrival of a delayed bus
pub const DELAY_PENALTY_MINUTES: i64 = 15;

/// Largest per-axis offset applied by one drift tick, in degrees
pub const DRIFT_MAGNITUDE_DEGREES: f64 = 0.001;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Convert a UTC instant into local wall-clock time at `offset`
#[must_use]
pub fn local_now(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDateTime {
    now.with_timezone(&offset).naive_local()
}

fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

// ============================================================================
// Journey duration
// ============================================================================

/// Length of a journey in whole hours and minutes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyDuration {
    /// Whole hours
    pub hours: u32,
    /// Remaining minutes (0-59)
    pub minutes: u32,
}

impl JourneyDuration {
    /// Total length in minutes
    #[must_use]
    pub const fn total_minutes(&self) -> u32 {
        self.hours * 60 + self.minutes
    }
}

impl fmt::Display for JourneyDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h {}m", self.hours, self.minutes)
    }
}

/// Time between departure and arrival
///
/// An arrival earlier in the day than the departure is taken to be on the
/// following day, so `23:00 -> 01:00` lasts two hours.
#[must_use]
pub fn journey_duration(departure: TimeOfDay, arrival: TimeOfDay) -> JourneyDuration {
    let dep = departure.minutes_of_day();
    let mut arr = arrival.minutes_of_day();
    if arr < dep {
        arr += MINUTES_PER_DAY;
    }
    let total = arr - dep;
    JourneyDuration {
        hours: total / 60,
        minutes: total % 60,
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Fraction of the journey completed at `now`, in `[0, 1]`
///
/// Interpolates linearly by minute of day. Overnight timetables are not
/// unwrapped: once `now` reaches the departure minute of a route whose
/// arrival is numerically earlier, the journey reads as complete.
#[must_use]
pub fn progress_fraction(departure: TimeOfDay, arrival: TimeOfDay, now: NaiveTime) -> f64 {
    let dep = departure.minutes_of_day();
    let arr = arrival.minutes_of_day();
    let cur = minute_of_day(now);

    if cur < dep {
        0.0
    } else if cur >= arr {
        1.0
    } else {
        f64::from(cur - dep) / f64::from(arr - dep)
    }
}

/// [`progress_fraction`] as a whole percentage (0-100)
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn progress_percent(departure: TimeOfDay, arrival: TimeOfDay, now: NaiveTime) -> u8 {
    (progress_fraction(departure, arrival, now) * 100.0).round().clamp(0.0, 100.0) as u8
}

// ============================================================================
// Estimated time of arrival
// ============================================================================

/// Time left until a bus reaches its destination
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Eta {
    /// Scheduled arrival has passed
    Arrived,
    /// Under an hour to go
    Minutes(u32),
    /// An hour or more to go
    HoursMinutes {
        /// Whole hours
        hours: u32,
        /// Remaining minutes (0-59)
        minutes: u32,
    },
}

impl Eta {
    fn from_minutes(minutes: i64) -> Self {
        match u32::try_from(minutes) {
            Ok(0) | Err(_) => Self::Arrived,
            Ok(m) if m < 60 => Self::Minutes(m),
            Ok(m) => Self::HoursMinutes {
                hours: m / 60,
                minutes: m % 60,
            },
        }
    }
}

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arrived => f.write_str("Arrived"),
            Self::Minutes(m) => write!(f, "{m} minutes"),
            Self::HoursMinutes { hours, minutes } => write!(f, "{hours}h {minutes}m"),
        }
    }
}

/// Time remaining until today's scheduled arrival
///
/// A delayed bus gets [`DELAY_PENALTY_MINUTES`] added to its arrival.
#[must_use]
pub fn estimated_time_remaining(arrival: TimeOfDay, status: BusStatus, now: NaiveDateTime) -> Eta {
    let penalty = Duration::minutes(DELAY_PENALTY_MINUTES);
    estimated_time_remaining_with_penalty(arrival, status, now, penalty)
}

/// [`estimated_time_remaining`] with a configurable delay penalty
///
/// The difference is rounded to the nearest minute, halves rounding up.
/// A penalty too large to add falls back to the scheduled arrival.
#[must_use]
pub fn estimated_time_remaining_with_penalty(
    arrival: TimeOfDay,
    status: BusStatus,
    now: NaiveDateTime,
    delay_penalty: Duration,
) -> Eta {
    let scheduled = now.date().and_time(arrival.to_naive_time());
    let arrives = if status == BusStatus::Delayed {
        scheduled.checked_add_signed(delay_penalty).unwrap_or(scheduled)
    } else {
        scheduled
    };
    let millis = (arrives - now).num_milliseconds();
    Eta::from_minutes(millis.saturating_add(30_000).div_euclid(60_000))
}

// ============================================================================
// Ticket timing
// ============================================================================

/// Where a trip sits relative to `now`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelTiming {
    /// Departure is still ahead
    Future,
    /// Travelling today and under way
    Today,
    /// Arrival has passed
    Past,
}

/// Classify a trip on `travel_date` against `now`
///
/// On the travel day itself, the trip is future until the departure minute
/// and past once the arrival minute has gone by. Other days compare by date.
#[must_use]
pub fn ticket_temporal_state(
    travel_date: NaiveDate,
    departure: TimeOfDay,
    arrival: TimeOfDay,
    now: NaiveDateTime,
) -> TravelTiming {
    let today = now.date();
    if travel_date == today {
        let cur = minute_of_day(now.time());
        if departure.minutes_of_day() > cur {
            TravelTiming::Future
        } else if arrival.minutes_of_day() < cur {
            TravelTiming::Past
        } else {
            TravelTiming::Today
        }
    } else if travel_date > today {
        TravelTiming::Future
    } else {
        TravelTiming::Past
    }
}

/// Status label shown on a ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketBadge {
    /// Ticket was cancelled
    Cancelled,
    /// Trip is over
    Completed,
    /// Trip is today
    Today,
    /// Trip is on a later date
    Upcoming,
}

impl fmt::Display for TicketBadge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Cancelled => "Cancelled",
            Self::Completed => "Completed",
            Self::Today => "Today",
            Self::Upcoming => "Upcoming",
        };
        f.write_str(label)
    }
}

/// Badge for `ticket` at `now`
#[must_use]
pub fn ticket_badge(ticket: &Ticket, now: NaiveDateTime) -> TicketBadge {
    if ticket.is_cancelled() {
        return TicketBadge::Cancelled;
    }
    match timing(ticket, now) {
        TravelTiming::Past => TicketBadge::Completed,
        _ if ticket.travel_date == now.date() => TicketBadge::Today,
        _ => TicketBadge::Upcoming,
    }
}

/// Whether `ticket` may still be cancelled: confirmed and not yet departed
#[must_use]
pub fn is_cancellable(ticket: &Ticket, now: NaiveDateTime) -> bool {
    ticket.is_confirmed() && timing(ticket, now) == TravelTiming::Future
}

fn timing(ticket: &Ticket, now: NaiveDateTime) -> TravelTiming {
    ticket_temporal_state(ticket.travel_date, ticket.departure_time, ticket.arrival_time, now)
}

/// Travel date offered by default when booking: tomorrow
#[must_use]
pub fn default_travel_date(today: NaiveDate) -> NaiveDate {
    today.succ_opt().unwrap_or(today)
}

// ============================================================================
// Position drift
// ============================================================================

/// One telemetry tick for `bus`, using the default magnitude
#[must_use]
pub fn simulated_position_drift(bus: &Bus, rng: &dyn RandomSource) -> Bus {
    simulated_position_drift_by(bus, rng, DRIFT_MAGNITUDE_DEGREES)
}

/// One telemetry tick: an in-transit bus moves by an independent uniform
/// offset in `[-magnitude, magnitude)` on each axis; other buses are unchanged
#[must_use]
pub fn simulated_position_drift_by(bus: &Bus, rng: &dyn RandomSource, magnitude: f64) -> Bus {
    let mut next = bus.clone();
    if bus.status == BusStatus::InTransit {
        next.current_location.lat += rng.next_unit().mul_add(2.0 * magnitude, -magnitude);
        next.current_location.lng += rng.next_unit().mul_add(2.0 * magnitude, -magnitude);
    }
    next
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::seats::SeatLayout;
    use crate::types::{
        BusId, GeoPosition, Money, RouteId, SeatCode, TicketId, TicketStatus, UserId,
    };
    use busline_testing::ScriptedRandom;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn clock(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn ticket(travel_date: &str, status: TicketStatus) -> Ticket {
        Ticket {
            id: TicketId::new("ticket-1"),
            user_id: UserId::new("1"),
            route_id: RouteId::new("route-1"),
            bus_id: BusId::new("bus-1"),
            seat_numbers: vec!["A3".parse::<SeatCode>().unwrap()],
            status,
            booking_date: DateTime::parse_from_rfc3339("2025-05-01T10:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
            travel_date: travel_date.parse().unwrap(),
            price: Money::from_dollars(45),
            from: "New York".into(),
            to: "Boston".into(),
            departure_time: t("08:00"),
            arrival_time: t("12:00"),
        }
    }

    fn bus(status: BusStatus) -> Bus {
        Bus {
            id: BusId::new("bus-1"),
            name: "Express Liner A1".into(),
            capacity: 45,
            current_location: GeoPosition::new(40.7128, -74.006),
            status,
            layout: SeatLayout::reference(),
        }
    }

    #[test]
    fn duration_same_day() {
        let d = journey_duration(t("07:30"), t("14:00"));
        assert_eq!(d, JourneyDuration { hours: 6, minutes: 30 });
        assert_eq!(d.to_string(), "6h 30m");
    }

    #[test]
    fn duration_wraps_overnight() {
        assert_eq!(
            journey_duration(t("23:00"), t("01:00")),
            JourneyDuration { hours: 2, minutes: 0 }
        );
        assert_eq!(journey_duration(t("10:30"), t("10:15")).total_minutes(), 23 * 60 + 45);
    }

    #[test]
    fn progress_is_linear_between_departure_and_arrival() {
        let at_clock = |now| progress_fraction(t("08:00"), t("12:00"), clock(now));
        assert!((at_clock("10:00") - 0.5).abs() < f64::EPSILON);
        assert!(at_clock("07:59").abs() < f64::EPSILON);
        assert!((at_clock("12:00") - 1.0).abs() < f64::EPSILON);
        assert!((at_clock("23:00") - 1.0).abs() < f64::EPSILON);
        assert_eq!(progress_percent(t("08:00"), t("12:00"), clock("09:00")), 25);
    }

    #[test]
    fn progress_overnight_is_not_unwrapped() {
        let at_clock = |now| progress_fraction(t("23:00"), t("01:00"), clock(now));
        assert!(at_clock("22:00").abs() < f64::EPSILON);
        assert!((at_clock("23:30") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn eta_formats() {
        let now = at("2025-06-01 10:00:00");
        let eta = |arrival| estimated_time_remaining(t(arrival), BusStatus::InTransit, now);
        assert_eq!(eta("12:00").to_string(), "2h 0m");
        assert_eq!(eta("10:45").to_string(), "45 minutes");
        assert_eq!(eta("10:00"), Eta::Arrived);
        assert_eq!(eta("08:00"), Eta::Arrived);
    }

    #[test]
    fn eta_adds_delay_penalty() {
        let now = at("2025-06-01 10:00:00");
        assert_eq!(estimated_time_remaining(t("10:00"), BusStatus::Delayed, now), Eta::Minutes(15));
        assert_eq!(
            estimated_time_remaining(t("11:00"), BusStatus::Delayed, now),
            Eta::HoursMinutes { hours: 1, minutes: 15 }
        );
    }

    #[test]
    fn unrepresentable_penalty_falls_back_to_schedule() {
        let now = at("2025-06-01 10:00:00");
        let eta = estimated_time_remaining_with_penalty(
            t("11:00"),
            BusStatus::Delayed,
            now,
            Duration::weeks(1_000_000_000),
        );
        assert_eq!(eta, Eta::HoursMinutes { hours: 1, minutes: 0 });
    }

    #[test]
    fn eta_rounds_to_nearest_minute() {
        let eta = |now| estimated_time_remaining(t("10:05"), BusStatus::AtStation, at(now));
        assert_eq!(eta("2025-06-01 10:00:31"), Eta::Minutes(4));
        assert_eq!(eta("2025-06-01 10:00:30"), Eta::Minutes(5));
    }

    #[test]
    fn temporal_state_on_travel_day() {
        let day: NaiveDate = "2025-06-01".parse().unwrap();
        let state = |now| ticket_temporal_state(day, t("08:00"), t("12:00"), at(now));
        assert_eq!(state("2025-06-01 07:00:00"), TravelTiming::Future);
        assert_eq!(state("2025-06-01 08:00:00"), TravelTiming::Today);
        assert_eq!(state("2025-06-01 12:00:00"), TravelTiming::Today);
        assert_eq!(state("2025-06-01 12:01:00"), TravelTiming::Past);
        assert_eq!(state("2025-05-31 23:00:00"), TravelTiming::Future);
        assert_eq!(state("2025-06-02 00:00:00"), TravelTiming::Past);
    }

    #[test]
    fn badges() {
        let now = at("2025-06-01 10:00:00");
        let badge = |date, status| ticket_badge(&ticket(date, status), now);
        assert_eq!(badge("2025-06-01", TicketStatus::Cancelled), TicketBadge::Cancelled);
        assert_eq!(badge("2025-05-10", TicketStatus::Confirmed), TicketBadge::Completed);
        assert_eq!(badge("2025-06-01", TicketStatus::Confirmed), TicketBadge::Today);
        assert_eq!(badge("2025-06-02", TicketStatus::Confirmed), TicketBadge::Upcoming);
    }

    #[test]
    fn cancellable_only_before_departure() {
        let confirmed = ticket("2025-06-01", TicketStatus::Confirmed);
        assert!(is_cancellable(&confirmed, at("2025-06-01 07:59:00")));
        assert!(!is_cancellable(&confirmed, at("2025-06-01 08:00:00")));
        let cancelled = ticket("2025-06-02", TicketStatus::Cancelled);
        assert!(!is_cancellable(&cancelled, at("2025-06-01 08:00:00")));
    }

    #[test]
    fn default_date_is_tomorrow() {
        let today: NaiveDate = "2025-12-31".parse().unwrap();
        assert_eq!(default_travel_date(today), "2026-01-01".parse::<NaiveDate>().unwrap());
    }

    #[test]
    fn local_time_applies_offset() {
        let now = DateTime::parse_from_rfc3339("2025-06-01T02:00:00Z").unwrap().with_timezone(&Utc);
        let offset = FixedOffset::west_opt(4 * 3600).unwrap();
        assert_eq!(local_now(now, offset), at("2025-05-31 22:00:00"));
    }

    #[test]
    fn drift_moves_only_in_transit_buses() {
        let rng = ScriptedRandom::new(vec![1.0, 0.0]);
        let moved = simulated_position_drift(&bus(BusStatus::InTransit), &rng);
        assert!((moved.current_location.lat - (40.7128 + 0.001)).abs() < 1e-9);
        assert!((moved.current_location.lng - (-74.006 - 0.001)).abs() < 1e-9);

        for status in [BusStatus::AtStation, BusStatus::Delayed, BusStatus::Maintenance] {
            let still = simulated_position_drift(&bus(status), &rng);
            assert_eq!(still.current_location, bus(status).current_location);
        }
    }

    #[test]
    fn drift_midpoint_is_stationary() {
        let rng = ScriptedRandom::constant(0.5);
        let moved = simulated_position_drift_by(&bus(BusStatus::InTransit), &rng, 0.01);
        assert_eq!(moved.current_location, bus(BusStatus::InTransit).current_location);
    }
}
