//! Route and bus directory: static timetable lookups.
//!
//! Routes and seat layouts never change at runtime, so the directory is a
//! plain immutable value shared behind an `Arc`. Live bus state (position,
//! status) lives in the fleet aggregate.

use crate::seats::SeatLayout;
use crate::types::{Bus, BusId, Route, RouteId};
use chrono::NaiveDate;
use std::collections::HashMap;

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Case-insensitive substring match; an absent or empty term matches anything
pub(crate) fn matches_term(haystack: &str, term: Option<&str>) -> bool {
    match term {
        None => true,
        Some(t) if t.is_empty() => true,
        Some(t) => contains_ignore_case(haystack, t),
    }
}

/// Timetable and seat layouts
#[derive(Clone, Debug, Default)]
pub struct Directory {
    routes: Vec<Route>,
    layouts: HashMap<BusId, SeatLayout>,
}

impl Directory {
    /// Build a directory from routes and the buses that operate them
    #[must_use]
    pub fn new(routes: Vec<Route>, buses: &[Bus]) -> Self {
        let layouts = buses.iter().map(|b| (b.id.clone(), b.layout.clone())).collect();
        Self { routes, layouts }
    }

    /// All routes in timetable order
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Look up a route
    #[must_use]
    pub fn route(&self, id: &RouteId) -> Option<&Route> {
        self.routes.iter().find(|r| &r.id == id)
    }

    /// Seat grid of a bus; unknown buses get the reference layout
    #[must_use]
    pub fn layout_for(&self, bus_id: &BusId) -> SeatLayout {
        self.layouts.get(bus_id).cloned().unwrap_or_default()
    }

    /// First route operated by `bus_id`
    #[must_use]
    pub fn route_for_bus(&self, bus_id: &BusId) -> Option<&Route> {
        self.routes.iter().find(|r| &r.bus_id == bus_id)
    }

    /// Routes whose origin and destination contain the given terms
    ///
    /// Matching is case-insensitive. `travel_date` is accepted for callers
    /// that carry one but does not narrow the result.
    #[must_use]
    pub fn filter_routes(
        &self,
        from: Option<&str>,
        to: Option<&str>,
        _travel_date: Option<NaiveDate>,
    ) -> Vec<&Route> {
        self.routes
            .iter()
            .filter(|r| matches_term(&r.from, from) && matches_term(&r.to, to))
            .collect()
    }

    /// Admin search: routes whose origin or destination contains `term`
    #[must_use]
    pub fn search_routes(&self, term: &str) -> Vec<&Route> {
        self.routes
            .iter()
            .filter(|r| {
                term.is_empty()
                    || contains_ignore_case(&r.from, term)
                    || contains_ignore_case(&r.to, term)
            })
            .collect()
    }
}
