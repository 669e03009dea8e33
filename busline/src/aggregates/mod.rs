//! Aggregate reducers for the bus ticketing engine.
//!
//! - Tickets: booking and cancellation
//! - Fleet: live bus positions

pub mod fleet;
pub mod tickets;

pub use fleet::{FleetAction, FleetEnvironment, FleetReducer, FleetState};
pub use tickets::{StatusFilter, TicketAction, TicketEnvironment, TicketReducer, TicketState};
