//! Application facade.
//!
//! [`BusTicketingApp`] wires the ticket and fleet stores, the directory and
//! the auth service together and exposes the operations a presentation
//! layer calls. Everything it needs is injected through [`Dependencies`].

use crate::aggregates::fleet::{FleetAction, FleetEnvironment, FleetReducer, FleetState};
use crate::aggregates::tickets::{
    StatusFilter, TicketAction, TicketEnvironment, TicketReducer, TicketState,
};
use crate::config::Config;
use crate::directory::Directory;
use crate::error::{AppError, BookingError};
use crate::seats::{demo_booked_seats, SeatMap};
use crate::seed;
use crate::session::{AuthService, InMemorySessionStore, SessionStore};
use crate::temporal::{self, Eta, JourneyDuration, TicketBadge};
use crate::types::{Bus, BusId, BusStatus, GeoPosition, Money, Route, RouteId, Ticket, TicketId};
use busline_core::environment::{
    Clock, IdGenerator, RandomSource, SystemClock, ThreadRandom, UuidIdGenerator,
};
use busline_runtime::Store;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Store running the ticket aggregate
pub type TicketStore = Store<TicketState, TicketAction, TicketEnvironment, TicketReducer>;

/// Store running the fleet aggregate
pub type FleetStore = Store<FleetState, FleetAction, FleetEnvironment, FleetReducer>;

/// Injected collaborators
#[derive(Clone)]
pub struct Dependencies {
    /// Wall clock
    pub clock: Arc<dyn Clock>,
    /// Ticket and user identifiers
    pub ids: Arc<dyn IdGenerator>,
    /// Position drift randomness
    pub rng: Arc<dyn RandomSource>,
    /// Where the logged-in user is remembered
    pub session: Arc<dyn SessionStore>,
}

impl Dependencies {
    /// System clock, UUID ids, thread-local randomness and an in-memory session
    #[must_use]
    pub fn system() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidIdGenerator),
            rng: Arc::new(ThreadRandom),
            session: Arc::new(InMemorySessionStore::new()),
        }
    }
}

/// Live view of one bus for the tracking page
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BusTracking {
    /// The bus as it is now
    pub bus: Bus,
    /// Route the bus runs, if any
    pub route: Option<Route>,
    /// Fraction of today's journey completed
    pub progress: f64,
    /// `progress` as a whole percentage
    pub progress_percent: u8,
    /// Time left until arrival
    pub eta: Option<Eta>,
    /// Scheduled journey length
    pub journey: Option<JourneyDuration>,
    /// Whether the bus is running late
    pub delayed: bool,
}

/// Headline numbers for the admin dashboard
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    /// Buses on the road
    pub active_buses: usize,
    /// Buses running late
    pub delayed_buses: usize,
    /// Fleet size
    pub total_buses: usize,
    /// Routes in the timetable
    pub total_routes: usize,
    /// Confirmed tickets
    pub passengers: usize,
    /// Tickets booked today (UTC)
    pub bookings_today: usize,
    /// Value of confirmed tickets
    pub revenue: Money,
}

/// The bus ticketing engine behind a single handle
#[derive(Clone)]
pub struct BusTicketingApp {
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    directory: Arc<Directory>,
    tickets: TicketStore,
    fleet: FleetStore,
    auth: AuthService,
}

impl BusTicketingApp {
    /// Start the engine on seed data with system dependencies
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_dependencies(config, Dependencies::system())
    }

    /// Start the engine on seed data with the given dependencies
    #[must_use]
    pub fn with_dependencies(config: Config, deps: Dependencies) -> Self {
        let buses = seed::buses();
        let directory = Arc::new(Directory::new(seed::routes(), &buses));

        let ticket_env = TicketEnvironment::new(
            Arc::clone(&deps.clock),
            Arc::clone(&deps.ids),
            Arc::clone(&directory),
        )
        .with_latency(config.simulated_latency())
        .with_max_seats(config.booking.max_seats_per_booking);
        let tickets = Store::new(
            TicketState::with_tickets(seed::tickets()),
            TicketReducer::new(),
            ticket_env,
        );

        let fleet_env = FleetEnvironment::new(deps.rng)
            .with_drift_magnitude(config.fleet.drift_magnitude_deg);
        let fleet = Store::new(FleetState::new(buses), FleetReducer::new(), fleet_env);

        let auth = AuthService::new(
            deps.session,
            deps.ids,
            seed::demo_credentials(),
            config.simulated_latency(),
        );

        tracing::info!(
            routes = directory.routes().len(),
            latency_ms = config.booking.simulated_latency_ms,
            "Bus ticketing engine ready"
        );

        Self {
            config: Arc::new(config),
            clock: deps.clock,
            directory,
            tickets,
            fleet,
            auth,
        }
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Login and session
    #[must_use]
    pub const fn auth(&self) -> &AuthService {
        &self.auth
    }

    /// Route timetable
    #[must_use]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Underlying ticket store
    #[must_use]
    pub const fn ticket_store(&self) -> &TicketStore {
        &self.tickets
    }

    /// Underlying fleet store
    #[must_use]
    pub const fn fleet_store(&self) -> &FleetStore {
        &self.fleet
    }

    /// Current local wall-clock time
    #[must_use]
    pub fn local_now(&self) -> NaiveDateTime {
        temporal::local_now(self.clock.now(), self.config.utc_offset())
    }

    /// Travel date preselected on the booking form
    #[must_use]
    pub fn default_travel_date(&self) -> NaiveDate {
        temporal::default_travel_date(self.local_now().date())
    }

    // ------------------------------------------------------------------
    // Tickets
    // ------------------------------------------------------------------

    async fn request(&self, action: TicketAction) -> Result<TicketAction, AppError> {
        let correlation_id = action.correlation_id();
        let timeout = self.config.request_timeout();
        let outcome = self
            .tickets
            .send_and_wait_for(action, move |a| a.is_outcome_of(correlation_id), timeout)
            .await?;
        Ok(outcome)
    }

    /// Book seats on a route for the logged-in user
    ///
    /// Resolves once the booking has been recorded, after the simulated
    /// latency. `travel_date` is an ISO `YYYY-MM-DD` date.
    ///
    /// # Errors
    ///
    /// - [`BookingError::InvalidTravelDate`] if the date does not parse
    /// - [`BookingError::NotAuthenticated`] if nobody is logged in
    /// - [`BookingError::RouteNotFound`] for an unknown route
    /// - [`BookingError::InvalidSeatSelection`] for a bad seat list
    /// - [`AppError::Store`] if the store is shutting down or times out
    #[tracing::instrument(skip(self, route_id, seats), fields(route_id = %route_id))]
    pub async fn book_ticket<S: AsRef<str>>(
        &self,
        route_id: &RouteId,
        seats: &[S],
        travel_date: &str,
    ) -> Result<Ticket, AppError> {
        let travel_date = travel_date
            .trim()
            .parse::<NaiveDate>()
            .map_err(|_| BookingError::InvalidTravelDate(travel_date.to_string()))?;

        let action = TicketAction::BookTicket {
            correlation_id: Uuid::new_v4(),
            user_id: self.auth.current_user().map(|u| u.id),
            route_id: route_id.clone(),
            seats: seats.iter().map(|s| s.as_ref().trim().to_string()).collect(),
            travel_date,
        };

        match self.request(action).await? {
            TicketAction::TicketBooked { ticket, .. } => Ok(ticket),
            TicketAction::RequestRejected { error, .. } => Err(error.into()),
            other => Err(AppError::UnexpectedOutcome(format!("{other:?}"))),
        }
    }

    /// Cancel a ticket
    ///
    /// Cancelling an already-cancelled ticket succeeds and changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::TicketNotFound`] for an unknown ticket, or
    /// [`AppError::Store`] if the store is shutting down or times out.
    #[tracing::instrument(skip(self, ticket_id), fields(ticket_id = %ticket_id))]
    pub async fn cancel_ticket(&self, ticket_id: &TicketId) -> Result<(), AppError> {
        let action = TicketAction::CancelTicket {
            correlation_id: Uuid::new_v4(),
            ticket_id: ticket_id.clone(),
        };

        match self.request(action).await? {
            TicketAction::TicketCancelled { .. } => Ok(()),
            TicketAction::RequestRejected { error, .. } => Err(error.into()),
            other => Err(AppError::UnexpectedOutcome(format!("{other:?}"))),
        }
    }

    /// The logged-in user's tickets in booking order; empty when logged out
    pub async fn user_tickets(&self) -> Vec<Ticket> {
        let Some(user) = self.auth.current_user() else {
            return Vec::new();
        };
        self.tickets
            .state(|s| s.for_user(&user.id).into_iter().cloned().collect())
            .await
    }

    /// The logged-in user's tickets narrowed by status and a city search
    pub async fn user_tickets_filtered(&self, status: StatusFilter, search: &str) -> Vec<Ticket> {
        let Some(user) = self.auth.current_user() else {
            return Vec::new();
        };
        self.tickets
            .state(|s| s.search_for_user(&user.id, status, search).into_iter().cloned().collect())
            .await
    }

    /// Look up any ticket
    pub async fn ticket_by_id(&self, ticket_id: &TicketId) -> Option<Ticket> {
        self.tickets.state(|s| s.get(ticket_id).cloned()).await
    }

    /// Badge shown on a ticket right now
    #[must_use]
    pub fn ticket_badge(&self, ticket: &Ticket) -> TicketBadge {
        temporal::ticket_badge(ticket, self.local_now())
    }

    /// Whether a ticket may be cancelled right now
    #[must_use]
    pub fn is_cancellable(&self, ticket: &Ticket) -> bool {
        temporal::is_cancellable(ticket, self.local_now())
    }

    /// Seat occupancy for a route on a travel date
    ///
    /// Booked seats are the demo seats plus every seat held by a confirmed
    /// ticket for the same route and date.
    ///
    /// # Errors
    ///
    /// Returns [`BookingError::RouteNotFound`] for an unknown route.
    pub async fn seat_map(
        &self,
        route_id: &RouteId,
        travel_date: NaiveDate,
    ) -> Result<SeatMap, AppError> {
        let route = self
            .directory
            .route(route_id)
            .ok_or_else(|| BookingError::RouteNotFound(route_id.clone()))?;
        let layout = self.directory.layout_for(&route.bus_id);

        let mut booked = self.tickets.state(|s| s.booked_seats(route_id, travel_date)).await;
        booked.extend(demo_booked_seats());

        Ok(SeatMap::new(layout, booked))
    }

    // ------------------------------------------------------------------
    // Routes and buses
    // ------------------------------------------------------------------

    /// Look up a route
    #[must_use]
    pub fn route(&self, route_id: &RouteId) -> Option<Route> {
        self.directory.route(route_id).cloned()
    }

    /// Routes matching origin/destination terms; the date does not narrow
    #[must_use]
    pub fn filter_routes(
        &self,
        from: Option<&str>,
        to: Option<&str>,
        travel_date: Option<NaiveDate>,
    ) -> Vec<Route> {
        self.directory
            .filter_routes(from, to, travel_date)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Look up a bus as it is now
    pub async fn bus(&self, bus_id: &BusId) -> Option<Bus> {
        self.fleet.state(|s| s.bus(bus_id).cloned()).await
    }

    /// Buses shown on the tracking page, with their routes
    pub async fn tracked_buses(&self, search: Option<&str>) -> Vec<(Bus, Option<Route>)> {
        self.fleet
            .state(|s| {
                s.tracked(&self.directory, search)
                    .into_iter()
                    .map(|(bus, route)| (bus.clone(), route.cloned()))
                    .collect()
            })
            .await
    }

    /// Live tracking view of one bus
    pub async fn tracking(&self, bus_id: &BusId) -> Option<BusTracking> {
        let bus = self.bus(bus_id).await?;
        let route = self.directory.route_for_bus(bus_id).cloned();
        let now = self.local_now();

        let (progress, progress_percent, eta, journey) = match &route {
            Some(r) => (
                temporal::progress_fraction(r.departure_time, r.arrival_time, now.time()),
                temporal::progress_percent(r.departure_time, r.arrival_time, now.time()),
                Some(temporal::estimated_time_remaining_with_penalty(
                    r.arrival_time,
                    bus.status,
                    now,
                    self.config.delay_penalty(),
                )),
                Some(temporal::journey_duration(r.departure_time, r.arrival_time)),
            ),
            None => (0.0, 0, None, None),
        };

        Some(BusTracking {
            delayed: bus.status == BusStatus::Delayed,
            bus,
            route,
            progress,
            progress_percent,
            eta,
            journey,
        })
    }

    /// Apply one position tick to the fleet
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] if the fleet store is shutting down.
    pub async fn tick_positions(&self) -> Result<(), AppError> {
        self.fleet.send(FleetAction::Tick).await?;
        Ok(())
    }

    /// Set a bus's position from an external feed
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] if the fleet store is shutting down.
    pub async fn update_bus_location(
        &self,
        bus_id: &BusId,
        position: GeoPosition,
    ) -> Result<(), AppError> {
        self.fleet
            .send(FleetAction::UpdateLocation {
                bus_id: bus_id.clone(),
                position,
            })
            .await?;
        Ok(())
    }

    /// Start ticking the fleet at the configured interval
    #[must_use]
    pub fn spawn_position_ticker(&self) -> JoinHandle<()> {
        spawn_position_ticker(self.fleet.clone(), self.config.drift_interval())
    }

    // ------------------------------------------------------------------
    // Admin console
    // ------------------------------------------------------------------

    fn require_admin(&self) -> Result<(), AppError> {
        if self.auth.is_admin() {
            Ok(())
        } else {
            Err(AppError::AdminRequired)
        }
    }

    /// Dashboard headline numbers
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AdminRequired`] unless an admin is logged in.
    pub async fn dashboard_stats(&self) -> Result<DashboardStats, AppError> {
        self.require_admin()?;
        let today = self.clock.now().date_naive();

        let (active_buses, delayed_buses, total_buses) = self
            .fleet
            .state(|f| {
                (
                    f.count_with_status(BusStatus::InTransit),
                    f.count_with_status(BusStatus::Delayed),
                    f.buses().len(),
                )
            })
            .await;
        let (passengers, bookings_today, revenue) = self
            .tickets
            .state(|t| (t.confirmed_count(), t.booked_on(today), t.confirmed_revenue()))
            .await;

        Ok(DashboardStats {
            active_buses,
            delayed_buses,
            total_buses,
            total_routes: self.directory.routes().len(),
            passengers,
            bookings_today,
            revenue,
        })
    }

    /// Every ticket matching a status and a search on id, cities or holder
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AdminRequired`] unless an admin is logged in.
    pub async fn admin_tickets(
        &self,
        search: &str,
        status: StatusFilter,
    ) -> Result<Vec<Ticket>, AppError> {
        self.require_admin()?;
        Ok(self
            .tickets
            .state(|s| s.search_all(status, search).into_iter().cloned().collect())
            .await)
    }

    /// Buses matching a search on id or name, with their routes
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AdminRequired`] unless an admin is logged in.
    pub async fn admin_buses(&self, search: &str) -> Result<Vec<(Bus, Option<Route>)>, AppError> {
        self.require_admin()?;
        Ok(self
            .fleet
            .state(|s| {
                s.search(search)
                    .into_iter()
                    .map(|bus| (bus.clone(), self.directory.route_for_bus(&bus.id).cloned()))
                    .collect()
            })
            .await)
    }

    /// Routes matching a search on origin or destination
    ///
    /// # Errors
    ///
    /// Returns [`AppError::AdminRequired`] unless an admin is logged in.
    pub fn admin_routes(&self, search: &str) -> Result<Vec<Route>, AppError> {
        self.require_admin()?;
        Ok(self.directory.search_routes(search).into_iter().cloned().collect())
    }

    /// Stop both stores, waiting up to `timeout` for in-flight requests
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] if requests are still running at the deadline.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), AppError> {
        self.fleet.shutdown(timeout).await?;
        self.tickets.shutdown(timeout).await?;
        Ok(())
    }
}

/// Send [`FleetAction::Tick`] to `store` every `period` until the store shuts down
///
/// The first tick fires one full period after the call.
#[must_use]
pub fn spawn_position_ticker(store: FleetStore, period: Duration) -> JoinHandle<()> {
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(error) = store.send(FleetAction::Tick).await {
                tracing::info!(%error, "Position ticker stopped");
                break;
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use busline_testing::{FixedClock, ScriptedRandom, SequentialIdGenerator};

    fn app_at(timestamp: &str) -> BusTicketingApp {
        app_with_config(timestamp, Config::for_tests())
    }

    fn app_with_config(timestamp: &str, config: Config) -> BusTicketingApp {
        BusTicketingApp::with_dependencies(
            config,
            Dependencies {
                clock: Arc::new(FixedClock::at(timestamp)),
                ids: Arc::new(SequentialIdGenerator::new("booking")),
                rng: Arc::new(ScriptedRandom::constant(1.0)),
                session: Arc::new(InMemorySessionStore::new()),
            },
        )
    }

    #[tokio::test]
    async fn tracking_reports_progress_and_eta() {
        let app = app_at("2025-06-01T10:00:00Z");
        let view = app.tracking(&BusId::new("bus-1")).await.unwrap();
        assert_eq!(view.route.as_ref().unwrap().id.as_str(), "route-1");
        assert!((view.progress - 0.5).abs() < f64::EPSILON);
        assert_eq!(view.progress_percent, 50);
        assert_eq!(view.eta, Some(Eta::HoursMinutes { hours: 2, minutes: 0 }));
        assert_eq!(view.journey.unwrap().to_string(), "4h 0m");
        assert!(!view.delayed);
    }

    #[tokio::test]
    async fn delayed_bus_eta_includes_penalty() {
        let app = app_at("2025-06-01T17:30:00Z");
        let view = app.tracking(&BusId::new("bus-2")).await.unwrap();
        assert!(view.delayed);
        assert_eq!(view.eta.unwrap().to_string(), "45 minutes");
    }

    #[tokio::test]
    async fn oversized_delay_penalty_is_capped_at_a_day() {
        let mut config = Config::for_tests();
        config.booking.delay_penalty_minutes = 1_000_000_000_000;
        let app = app_with_config("2025-06-01T17:30:00Z", config);
        let view = app.tracking(&BusId::new("bus-2")).await.unwrap();
        assert_eq!(view.eta, Some(Eta::HoursMinutes { hours: 24, minutes: 30 }));
    }

    #[tokio::test]
    async fn tracking_unknown_bus() {
        let app = app_at("2025-06-01T10:00:00Z");
        assert!(app.tracking(&BusId::new("bus-42")).await.is_none());
    }

    #[tokio::test]
    async fn tick_moves_in_transit_buses() {
        let app = app_at("2025-06-01T10:00:00Z");
        let before = app.bus(&BusId::new("bus-1")).await.unwrap().current_location;
        app.tick_positions().await.unwrap();
        let after = app.bus(&BusId::new("bus-1")).await.unwrap().current_location;
        assert!((after.lat - before.lat - 0.001).abs() < 1e-9);

        let parked = app.bus(&BusId::new("bus-3")).await.unwrap();
        assert_eq!(parked.current_location, GeoPosition::new(40.6928, -74.026));
    }

    #[tokio::test]
    async fn update_location_overrides_position() {
        let app = app_at("2025-06-01T10:00:00Z");
        let boston = GeoPosition::new(42.3601, -71.0589);
        app.update_bus_location(&BusId::new("bus-7"), boston).await.unwrap();
        assert_eq!(app.bus(&BusId::new("bus-7")).await.unwrap().current_location, boston);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_ticks_every_interval() {
        let app = app_at("2025-06-01T10:00:00Z");
        let start = app.bus(&BusId::new("bus-1")).await.unwrap().current_location;
        let handle = spawn_position_ticker(app.fleet_store().clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(25)).await;
        let now = app.bus(&BusId::new("bus-1")).await.unwrap().current_location;
        assert!((now.lat - start.lat - 0.002).abs() < 1e-9);

        handle.abort();
    }

    #[tokio::test]
    async fn tracked_buses_hide_maintenance() {
        let app = app_at("2025-06-01T10:00:00Z");
        assert_eq!(app.tracked_buses(None).await.len(), 7);
        let hits = app.tracked_buses(Some("boston")).await;
        let ids: Vec<&str> = hits.iter().map(|(b, _)| b.id.as_str()).collect();
        assert_eq!(ids, ["bus-1", "bus-2", "bus-7", "bus-8"]);
    }

    #[tokio::test]
    async fn admin_views_require_admin() {
        let app = app_at("2025-06-01T10:00:00Z");
        assert_eq!(app.dashboard_stats().await, Err(AppError::AdminRequired));
        assert!(matches!(app.admin_routes(""), Err(AppError::AdminRequired)));

        app.auth().login("user@example.com", "password").await.unwrap();
        assert!(matches!(
            app.admin_tickets("", StatusFilter::All).await,
            Err(AppError::AdminRequired)
        ));
    }

    #[tokio::test]
    async fn dashboard_stats_for_admin() {
        let app = app_at("2025-05-02T18:00:00Z");
        app.auth().login("admin@example.com", "admin").await.unwrap();
        let stats = app.dashboard_stats().await.unwrap();
        assert_eq!(
            stats,
            DashboardStats {
                active_buses: 4,
                delayed_buses: 1,
                total_buses: 8,
                total_routes: 10,
                passengers: 2,
                bookings_today: 1,
                revenue: Money::from_dollars(225),
            }
        );

        assert_eq!(app.admin_buses("express").await.unwrap().len(), 2);
        assert_eq!(app.admin_routes("philadelphia").unwrap().len(), 2);
        assert_eq!(app.admin_tickets("", StatusFilter::Cancelled).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn default_travel_date_is_tomorrow() {
        let app = app_at("2025-06-01T23:30:00Z");
        assert_eq!(app.default_travel_date(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
    }
}
