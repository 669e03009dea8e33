//! Fleet aggregate: live bus positions.
//!
//! Buses move on every telemetry tick. Running ticks through a store keeps
//! position updates on the same single-writer path as every other mutation.

use crate::directory::{matches_term, Directory};
use crate::temporal::{simulated_position_drift_by, DRIFT_MAGNITUDE_DEGREES};
use crate::types::{Bus, BusId, BusStatus, GeoPosition, Route};
use busline_core::{effect::Effect, environment::RandomSource, reducer::Reducer, SmallVec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Current state of every bus
#[derive(Clone, Debug, Default)]
pub struct FleetState {
    buses: Vec<Bus>,
}

impl FleetState {
    /// A fleet starting from `buses`
    #[must_use]
    pub const fn new(buses: Vec<Bus>) -> Self {
        Self { buses }
    }

    /// Look up a bus
    #[must_use]
    pub fn bus(&self, id: &BusId) -> Option<&Bus> {
        self.buses.iter().find(|b| &b.id == id)
    }

    /// Every bus in fleet order
    #[must_use]
    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    /// Number of buses with `status`
    #[must_use]
    pub fn count_with_status(&self, status: BusStatus) -> usize {
        self.buses.iter().filter(|b| b.status == status).count()
    }

    /// Admin search on bus id and name
    #[must_use]
    pub fn search(&self, term: &str) -> Vec<&Bus> {
        self.buses
            .iter()
            .filter(|b| {
                matches_term(b.id.as_str(), Some(term)) || matches_term(&b.name, Some(term))
            })
            .collect()
    }

    /// Buses shown on the tracking page with the route each one runs
    ///
    /// Buses in maintenance are hidden. With a search term, a bus is kept
    /// when it has a route and the term appears in its id, its name, or its
    /// route's origin or destination.
    #[must_use]
    pub fn tracked<'a>(
        &'a self,
        directory: &'a Directory,
        search: Option<&str>,
    ) -> Vec<(&'a Bus, Option<&'a Route>)> {
        let term = search.filter(|t| !t.is_empty());
        self.buses
            .iter()
            .filter(|b| b.status != BusStatus::Maintenance)
            .map(|b| (b, directory.route_for_bus(&b.id)))
            .filter(|(bus, route)| match (term, route) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(t), Some(route)) => {
                    [bus.id.as_str(), bus.name.as_str(), route.from.as_str(), route.to.as_str()]
                        .iter()
                        .any(|field| matches_term(field, Some(t)))
                },
            })
            .collect()
    }
}

/// Actions for the fleet aggregate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum FleetAction {
    /// One telemetry tick: drift every in-transit bus
    Tick,
    /// Set a bus's position from an external feed
    UpdateLocation {
        /// Bus to move
        bus_id: BusId,
        /// New position
        position: GeoPosition,
    },
}

/// Dependencies of the fleet reducer
#[derive(Clone)]
pub struct FleetEnvironment {
    /// Randomness for position drift
    pub rng: Arc<dyn RandomSource>,
    /// Largest drift per axis per tick, in degrees
    pub drift_magnitude: f64,
}

impl FleetEnvironment {
    /// Creates an environment with the default drift magnitude
    #[must_use]
    pub fn new(rng: Arc<dyn RandomSource>) -> Self {
        Self {
            rng,
            drift_magnitude: DRIFT_MAGNITUDE_DEGREES,
        }
    }

    /// Override the drift magnitude
    #[must_use]
    pub const fn with_drift_magnitude(mut self, degrees: f64) -> Self {
        self.drift_magnitude = degrees;
        self
    }
}

/// Reducer for the fleet aggregate
#[derive(Clone, Debug, Default)]
pub struct FleetReducer;

impl FleetReducer {
    /// Creates a new `FleetReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for FleetReducer {
    type State = FleetState;
    type Action = FleetAction;
    type Environment = FleetEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            FleetAction::Tick => {
                for bus in &mut state.buses {
                    *bus = simulated_position_drift_by(bus, env.rng.as_ref(), env.drift_magnitude);
                }
                tracing::trace!(buses = state.buses.len(), "Fleet positions drifted");
            },

            FleetAction::UpdateLocation { bus_id, position } => {
                match state.buses.iter_mut().find(|b| b.id == bus_id) {
                    Some(bus) => {
                        bus.current_location = position;
                        tracing::debug!(bus_id = %bus_id, %position, "Bus location updated");
                    },
                    None => tracing::warn!(bus_id = %bus_id, "Location update for unknown bus"),
                }
            },
        }

        SmallVec::new()
    }
}
