//! Ticket aggregate: booking and cancellation.
//!
//! Commands are validated as soon as they reach the reducer, against the
//! directory and the current state. The outcome (an event, or a rejection)
//! is scheduled with `Effect::Delay` so it lands after the simulated round
//! trip. State only changes when the event is reduced, so a rejected
//! request never touches the store.

use crate::directory::Directory;
use crate::error::BookingError;
use crate::seats::{validate_selection, MAX_SEATS_PER_BOOKING};
use crate::types::{Money, RouteId, SeatCode, Ticket, TicketId, TicketStatus, UserId};
use busline_core::{
    delay,
    effect::Effect,
    environment::{Clock, IdGenerator},
    reducer::Reducer,
    smallvec, SmallVec,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// State
// ============================================================================

/// Every ticket ever booked, in booking order
#[derive(Clone, Debug, Default)]
pub struct TicketState {
    tickets: Vec<Ticket>,
    /// Most recent rejection, cleared by the next successful event
    pub last_error: Option<BookingError>,
}

impl TicketState {
    /// An empty ticket store
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tickets: Vec::new(),
            last_error: None,
        }
    }

    /// A store pre-loaded with existing tickets
    #[must_use]
    pub const fn with_tickets(tickets: Vec<Ticket>) -> Self {
        Self {
            tickets,
            last_error: None,
        }
    }

    /// Look up a ticket
    #[must_use]
    pub fn get(&self, id: &TicketId) -> Option<&Ticket> {
        self.tickets.iter().find(|t| &t.id == id)
    }

    /// All tickets in booking order
    #[must_use]
    pub fn all(&self) -> &[Ticket] {
        &self.tickets
    }

    /// Number of tickets on record
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// Whether no tickets are on record
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Tickets held by `user_id`, confirmed and cancelled, in booking order
    #[must_use]
    pub fn for_user(&self, user_id: &UserId) -> Vec<&Ticket> {
        self.tickets.iter().filter(|t| &t.user_id == user_id).collect()
    }

    /// Seats held by confirmed tickets on a route and travel date
    #[must_use]
    pub fn booked_seats(&self, route_id: &RouteId, travel_date: NaiveDate) -> BTreeSet<SeatCode> {
        self.tickets
            .iter()
            .filter(|t| t.is_confirmed() && &t.route_id == route_id && t.travel_date == travel_date)
            .flat_map(|t| t.seat_numbers.iter().copied())
            .collect()
    }

    /// Number of confirmed tickets
    #[must_use]
    pub fn confirmed_count(&self) -> usize {
        self.tickets.iter().filter(|t| t.is_confirmed()).count()
    }

    /// Sum of confirmed ticket prices
    #[must_use]
    pub fn confirmed_revenue(&self) -> Money {
        self.tickets.iter().filter(|t| t.is_confirmed()).map(|t| t.price).sum()
    }

    /// Number of tickets booked on `date` (UTC)
    #[must_use]
    pub fn booked_on(&self, date: NaiveDate) -> usize {
        self.tickets.iter().filter(|t| t.booking_date.date_naive() == date).count()
    }

    /// A user's tickets narrowed by status and an origin/destination search
    #[must_use]
    pub fn search_for_user(
        &self,
        user_id: &UserId,
        status: StatusFilter,
        term: &str,
    ) -> Vec<&Ticket> {
        let term = term.to_lowercase();
        let mentions = |place: &str| place.to_lowercase().contains(&term);
        self.tickets
            .iter()
            .filter(|t| &t.user_id == user_id && status.matches(t))
            .filter(|t| term.is_empty() || mentions(&t.from) || mentions(&t.to))
            .collect()
    }

    /// Admin search over ticket id, origin, destination and holder
    #[must_use]
    pub fn search_all(&self, status: StatusFilter, term: &str) -> Vec<&Ticket> {
        let term = term.to_lowercase();
        self.tickets
            .iter()
            .filter(|t| status.matches(t))
            .filter(|t| {
                term.is_empty()
                    || [t.id.as_str(), &t.from, &t.to, t.user_id.as_str()]
                        .iter()
                        .any(|field| field.to_lowercase().contains(&term))
            })
            .collect()
    }
}

/// Status filter for ticket listings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    /// Every ticket
    #[default]
    All,
    /// Confirmed tickets only
    Confirmed,
    /// Cancelled tickets only
    Cancelled,
}

impl StatusFilter {
    /// Whether `ticket` passes the filter
    #[must_use]
    pub fn matches(self, ticket: &Ticket) -> bool {
        match self {
            Self::All => true,
            Self::Confirmed => ticket.status == TicketStatus::Confirmed,
            Self::Cancelled => ticket.status == TicketStatus::Cancelled,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" | "" => Ok(Self::All),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown status filter: {other}")),
        }
    }
}

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the ticket aggregate
///
/// Every request carries a `correlation_id`; the matching outcome echoes it
/// so a caller can wait for the answer to its own request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TicketAction {
    // Commands
    /// Book seats on a route for a travel date
    BookTicket {
        /// Request identifier
        correlation_id: Uuid,
        /// Logged-in user, if any
        user_id: Option<UserId>,
        /// Route to book
        route_id: RouteId,
        /// Raw seat labels as picked
        seats: Vec<String>,
        /// Day of travel
        travel_date: NaiveDate,
    },

    /// Cancel a ticket
    CancelTicket {
        /// Request identifier
        correlation_id: Uuid,
        /// Ticket to cancel
        ticket_id: TicketId,
    },

    // Events
    /// A booking was accepted
    TicketBooked {
        /// Request identifier
        correlation_id: Uuid,
        /// The new ticket
        ticket: Ticket,
    },

    /// A ticket was cancelled
    TicketCancelled {
        /// Request identifier
        correlation_id: Uuid,
        /// Cancelled ticket
        ticket_id: TicketId,
    },

    /// A booking or cancellation request failed validation
    RequestRejected {
        /// Request identifier
        correlation_id: Uuid,
        /// Why it failed
        error: BookingError,
    },
}

impl TicketAction {
    /// Request identifier carried by every action
    #[must_use]
    pub const fn correlation_id(&self) -> Uuid {
        match self {
            Self::BookTicket { correlation_id, .. }
            | Self::CancelTicket { correlation_id, .. }
            | Self::TicketBooked { correlation_id, .. }
            | Self::TicketCancelled { correlation_id, .. }
            | Self::RequestRejected { correlation_id, .. } => *correlation_id,
        }
    }

    /// Whether this is a request
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(self, Self::BookTicket { .. } | Self::CancelTicket { .. })
    }

    /// Whether this is the outcome of a request
    #[must_use]
    pub const fn is_event(&self) -> bool {
        !self.is_command()
    }

    /// Whether this is the outcome of request `correlation_id`
    #[must_use]
    pub fn is_outcome_of(&self, correlation_id: Uuid) -> bool {
        self.is_event() && self.correlation_id() == correlation_id
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the ticket reducer
#[derive(Clone)]
pub struct TicketEnvironment {
    /// Clock for booking timestamps
    pub clock: Arc<dyn Clock>,
    /// Source of ticket identifiers
    pub ids: Arc<dyn IdGenerator>,
    /// Route timetable and seat layouts
    pub directory: Arc<Directory>,
    /// Simulated round-trip time before an outcome lands
    pub latency: Duration,
    /// Per-booking seat limit
    pub max_seats: usize,
}

impl TicketEnvironment {
    /// Creates an environment with one second of latency and a four-seat limit
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        directory: Arc<Directory>,
    ) -> Self {
        Self {
            clock,
            ids,
            directory,
            latency: Duration::from_secs(1),
            max_seats: MAX_SEATS_PER_BOOKING,
        }
    }

    /// Override the simulated latency
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Override the per-booking seat limit
    #[must_use]
    pub const fn with_max_seats(mut self, max_seats: usize) -> Self {
        self.max_seats = max_seats;
        self
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the ticket aggregate
#[derive(Clone, Debug, Default)]
pub struct TicketReducer;

impl TicketReducer {
    /// Creates a new `TicketReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Build the ticket a booking request would create, or say why not
    fn validate_booking(
        user_id: Option<UserId>,
        route_id: &RouteId,
        seats: &[String],
        travel_date: NaiveDate,
        env: &TicketEnvironment,
    ) -> Result<Ticket, BookingError> {
        let user_id = user_id.ok_or(BookingError::NotAuthenticated)?;
        let route = env
            .directory
            .route(route_id)
            .ok_or_else(|| BookingError::RouteNotFound(route_id.clone()))?;

        let layout = env.directory.layout_for(&route.bus_id);
        let seat_numbers = validate_selection(&layout, seats, env.max_seats)?;
        let count = u32::try_from(seat_numbers.len()).unwrap_or(u32::MAX);

        Ok(Ticket {
            id: TicketId::new(env.ids.next_id()),
            user_id,
            route_id: route.id.clone(),
            bus_id: route.bus_id.clone(),
            seat_numbers,
            status: TicketStatus::Confirmed,
            booking_date: env.clock.now(),
            travel_date,
            price: route.price.saturating_multiply(count),
            from: route.from.clone(),
            to: route.to.clone(),
            departure_time: route.departure_time,
            arrival_time: route.arrival_time,
        })
    }

    /// Apply an event to state
    fn apply_event(state: &mut TicketState, action: &TicketAction) {
        match action {
            TicketAction::TicketBooked { ticket, .. } => {
                if state.get(&ticket.id).is_some() {
                    tracing::warn!(ticket_id = %ticket.id, "Duplicate ticket id, booking ignored");
                    return;
                }
                state.tickets.push(ticket.clone());
                state.last_error = None;
            },

            TicketAction::TicketCancelled { ticket_id, .. } => {
                match state.tickets.iter_mut().find(|t| &t.id == ticket_id) {
                    Some(ticket) if ticket.is_cancelled() => {
                        tracing::debug!(ticket_id = %ticket_id, "Ticket already cancelled");
                    },
                    Some(ticket) => ticket.status = TicketStatus::Cancelled,
                    None => {
                        tracing::warn!(ticket_id = %ticket_id, "Cancellation for unknown ticket");
                    },
                }
                state.last_error = None;
            },

            TicketAction::RequestRejected { error, .. } => {
                state.last_error = Some(error.clone());
            },

            // Commands are not events
            TicketAction::BookTicket { .. } | TicketAction::CancelTicket { .. } => {},
        }
    }
}

impl Reducer for TicketReducer {
    type State = TicketState;
    type Action = TicketAction;
    type Environment = TicketEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Commands ==========
            TicketAction::BookTicket {
                correlation_id,
                user_id,
                route_id,
                seats,
                travel_date,
            } => {
                let validated =
                    Self::validate_booking(user_id, &route_id, &seats, travel_date, env);
                let outcome = match validated {
                    Ok(ticket) => {
                        tracing::info!(
                            ticket_id = %ticket.id,
                            route_id = %route_id,
                            seats = seats.len(),
                            price = %ticket.price,
                            "Booking accepted"
                        );
                        TicketAction::TicketBooked { correlation_id, ticket }
                    },
                    Err(error) => {
                        tracing::warn!(route_id = %route_id, %error, "Booking rejected");
                        TicketAction::RequestRejected { correlation_id, error }
                    },
                };

                smallvec![delay! {
                    duration: env.latency,
                    action: outcome
                }]
            },

            TicketAction::CancelTicket {
                correlation_id,
                ticket_id,
            } => {
                let outcome = if state.get(&ticket_id).is_some() {
                    tracing::info!(ticket_id = %ticket_id, "Cancellation accepted");
                    TicketAction::TicketCancelled {
                        correlation_id,
                        ticket_id,
                    }
                } else {
                    tracing::warn!(
                        ticket_id = %ticket_id,
                        "Cancellation rejected: ticket not found"
                    );
                    TicketAction::RequestRejected {
                        correlation_id,
                        error: BookingError::TicketNotFound(ticket_id),
                    }
                };

                smallvec![delay! {
                    duration: env.latency,
                    action: outcome
                }]
            },

            // ========== Events ==========
            event => {
                Self::apply_event(state, &event);
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::SeatSelectionError;
    use crate::seats::SeatLayout;
    use crate::seed;
    use busline_testing::{test_clock, ReducerTest, Scheduled, SequentialIdGenerator};
    use proptest::prelude::*;

    fn create_test_env() -> TicketEnvironment {
        TicketEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(SequentialIdGenerator::new("ticket")),
            Arc::new(Directory::new(seed::routes(), &seed::buses())),
        )
    }

    fn reducer_test() -> ReducerTest<TicketReducer> {
        ReducerTest::new(TicketReducer::new(), create_test_env())
    }

    fn book(route: &str, seats: &[&str], user: Option<&str>) -> TicketAction {
        TicketAction::BookTicket {
            correlation_id: Uuid::nil(),
            user_id: user.map(UserId::new),
            route_id: RouteId::new(route),
            seats: seats.iter().map(|s| (*s).to_string()).collect(),
            travel_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        }
    }

    fn cancel(ticket_id: &str) -> TicketAction {
        TicketAction::CancelTicket {
            correlation_id: Uuid::nil(),
            ticket_id: TicketId::new(ticket_id),
        }
    }

    fn booked_ticket(scheduled: &[Scheduled<TicketAction>]) -> Ticket {
        match scheduled {
            [Scheduled {
                action: TicketAction::TicketBooked { ticket, .. },
                ..
            }] => ticket.clone(),
            other => panic!("expected TicketBooked, got {other:?}"),
        }
    }

    fn rejection(scheduled: &[Scheduled<TicketAction>]) -> BookingError {
        match scheduled {
            [Scheduled {
                action: TicketAction::RequestRejected { error, .. },
                ..
            }] => error.clone(),
            other => panic!("expected RequestRejected, got {other:?}"),
        }
    }

    #[test]
    fn test_book_ticket_schedules_confirmation() {
        reducer_test()
            .given(TicketState::new())
            .when(book("route-1", &["A3", "A4"], Some("1")))
            .then_state(|state| {
                // Nothing changes until the delayed event lands
                assert!(state.is_empty());
            })
            .then_scheduled(|scheduled| {
                assert_eq!(scheduled[0].after, Duration::from_secs(1));

                let ticket = booked_ticket(scheduled);
                assert_eq!(ticket.id, TicketId::new("ticket-1"));
                assert_eq!(ticket.price.to_string(), "$90.00");
                assert_eq!(ticket.status, TicketStatus::Confirmed);
                assert_eq!(ticket.bus_id.as_str(), "bus-1");
                assert_eq!((ticket.from.as_str(), ticket.to.as_str()), ("New York", "Boston"));
                assert_eq!(ticket.booking_date, test_clock().now());
                let seats: Vec<String> =
                    ticket.seat_numbers.iter().map(ToString::to_string).collect();
                assert_eq!(seats, ["A3", "A4"]);
            })
            .run();
    }

    #[test]
    fn test_booked_event_appends_ticket() {
        let ticket = seed::tickets().remove(0);
        let id = ticket.id.clone();

        reducer_test()
            .given(TicketState::new())
            .when(TicketAction::TicketBooked {
                correlation_id: Uuid::nil(),
                ticket,
            })
            .then_state(move |state| {
                assert_eq!(state.len(), 1);
                assert!(state.get(&id).is_some());
            })
            .then_quiet()
            .run();
    }

    #[test]
    fn test_duplicate_ticket_id_is_ignored() {
        let tickets = seed::tickets();
        let again = tickets[0].clone();

        reducer_test()
            .given(TicketState::with_tickets(tickets))
            .when(TicketAction::TicketBooked {
                correlation_id: Uuid::nil(),
                ticket: again,
            })
            .then_state(|state| assert_eq!(state.len(), 3))
            .then_quiet()
            .run();
    }

    #[test]
    fn test_not_authenticated() {
        reducer_test()
            .given(TicketState::new())
            .when(book("route-1", &["A3"], None))
            .then_scheduled(|scheduled| {
                assert_eq!(rejection(scheduled), BookingError::NotAuthenticated);
            })
            .run();
    }

    #[test]
    fn test_unknown_route() {
        reducer_test()
            .given(TicketState::new())
            .when(book("route-99", &["A3"], Some("1")))
            .then_scheduled(|scheduled| {
                assert_eq!(
                    rejection(scheduled),
                    BookingError::RouteNotFound(RouteId::new("route-99"))
                );
            })
            .run();
    }

    #[test]
    fn test_duplicate_seats_rejected() {
        reducer_test()
            .given(TicketState::new())
            .when(book("route-1", &["A1", "A1"], Some("1")))
            .then_scheduled(|scheduled| {
                assert!(matches!(
                    rejection(scheduled),
                    BookingError::InvalidSeatSelection(SeatSelectionError::Duplicate { .. })
                ));
            })
            .run();
    }

    #[test]
    fn test_five_seats_rejected() {
        reducer_test()
            .given(TicketState::new())
            .when(book("route-1", &["A3", "A4", "A5", "A6", "A7"], Some("1")))
            .then_scheduled(|scheduled| {
                assert_eq!(
                    rejection(scheduled),
                    BookingError::InvalidSeatSelection(SeatSelectionError::TooMany {
                        count: 5,
                        max: 4
                    })
                );
            })
            .run();
    }

    #[test]
    fn test_rejection_records_error_without_mutation() {
        reducer_test()
            .given(TicketState::with_tickets(seed::tickets()))
            .when(TicketAction::RequestRejected {
                correlation_id: Uuid::nil(),
                error: BookingError::NotAuthenticated,
            })
            .then_state(|state| {
                assert_eq!(state.len(), 3);
                assert_eq!(state.last_error, Some(BookingError::NotAuthenticated));
            })
            .then_quiet()
            .run();
    }

    #[test]
    fn test_cancel_schedules_cancellation() {
        reducer_test()
            .given(TicketState::with_tickets(seed::tickets()))
            .when(cancel("ticket-1"))
            .then_state(|state| {
                assert!(state.get(&TicketId::new("ticket-1")).unwrap().is_confirmed());
            })
            .then_scheduled(|scheduled| {
                assert!(matches!(
                    scheduled,
                    [Scheduled {
                        action: TicketAction::TicketCancelled { ticket_id, .. },
                        ..
                    }] if ticket_id.as_str() == "ticket-1"
                ));
            })
            .run();
    }

    #[test]
    fn test_cancel_unknown_ticket() {
        reducer_test()
            .given(TicketState::with_tickets(seed::tickets()))
            .when(cancel("ticket-404"))
            .then_scheduled(|scheduled| {
                assert_eq!(
                    rejection(scheduled),
                    BookingError::TicketNotFound(TicketId::new("ticket-404"))
                );
            })
            .run();
    }

    #[test]
    fn test_cancelled_event_is_idempotent() {
        let before = seed::tickets()[1].clone();
        assert!(before.is_cancelled());

        reducer_test()
            .given(TicketState::with_tickets(seed::tickets()))
            .when(TicketAction::TicketCancelled {
                correlation_id: Uuid::nil(),
                ticket_id: before.id.clone(),
            })
            .then_state(move |state| assert_eq!(state.get(&before.id), Some(&before)))
            .then_quiet()
            .run();
    }

    #[test]
    fn test_cancel_changes_only_status() {
        let before = seed::tickets()[0].clone();

        reducer_test()
            .given(TicketState::with_tickets(seed::tickets()))
            .when(TicketAction::TicketCancelled {
                correlation_id: Uuid::nil(),
                ticket_id: before.id.clone(),
            })
            .then_state(move |state| {
                let after = state.get(&before.id).unwrap();
                assert!(after.is_cancelled());
                assert_eq!(
                    Ticket {
                        status: TicketStatus::Confirmed,
                        ..after.clone()
                    },
                    before
                );
            })
            .run();
    }

    proptest! {
        #[test]
        fn price_is_route_price_times_seat_count(
            route_index in 0usize..10,
            seat_indices in proptest::collection::btree_set(0usize..40, 1..=4),
        ) {
            let route = seed::routes().remove(route_index);
            let all_seats = SeatLayout::reference().seats();
            let seats: Vec<String> =
                seat_indices.iter().map(|&i| all_seats[i].to_string()).collect();
            let expected: Money = std::iter::repeat(route.price).take(seats.len()).sum();

            reducer_test()
                .given(TicketState::new())
                .when(TicketAction::BookTicket {
                    correlation_id: Uuid::nil(),
                    user_id: Some(UserId::new("1")),
                    route_id: route.id.clone(),
                    seats,
                    travel_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                })
                .then_scheduled(move |scheduled| {
                    let ticket = booked_ticket(scheduled);
                    assert_eq!(ticket.price, expected);
                    assert_eq!(ticket.seat_numbers.len(), seat_indices.len());
                    assert_eq!(ticket.route_id, route.id);
                })
                .run();
        }
    }

    #[test]
    fn queries_over_seed_tickets() {
        let state = TicketState::with_tickets(seed::tickets());
        assert_eq!(state.for_user(&UserId::new("1")).len(), 2);
        assert_eq!(state.confirmed_count(), 2);
        assert_eq!(state.confirmed_revenue(), Money::from_dollars(225));
        assert_eq!(state.booked_on(NaiveDate::from_ymd_opt(2025, 5, 2).unwrap()), 1);

        let may_10 = NaiveDate::from_ymd_opt(2025, 5, 10).unwrap();
        let booked = state.booked_seats(&RouteId::new("route-1"), may_10);
        let labels: Vec<String> = booked.iter().map(ToString::to_string).collect();
        assert_eq!(labels, ["A3", "A4"]);
        // cancelled ticket-2 frees its seat
        let may_15 = NaiveDate::from_ymd_opt(2025, 5, 15).unwrap();
        assert!(state.booked_seats(&RouteId::new("route-3"), may_15).is_empty());
    }

    #[test]
    fn search_filters() {
        let state = TicketState::with_tickets(seed::tickets());
        let user = UserId::new("1");
        assert_eq!(state.search_for_user(&user, StatusFilter::Cancelled, "").len(), 1);
        assert_eq!(state.search_for_user(&user, StatusFilter::All, "washington").len(), 1);
        assert_eq!(state.search_all(StatusFilter::Confirmed, "").len(), 2);
        assert_eq!(state.search_all(StatusFilter::All, "ticket-3").len(), 1);
        assert_eq!(state.search_all(StatusFilter::All, "BOSTON").len(), 2);
        assert_eq!("cancelled".parse::<StatusFilter>(), Ok(StatusFilter::Cancelled));
    }
}
