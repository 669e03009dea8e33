//! Busline - bus ticketing engine
//!
//! Booking and ticket lifecycle for an intercity bus network, built on the
//! Busline reducer architecture. It covers:
//!
//! - **Seat inventory**: the seat grid of each bus, booked/selected/available
//!   classification and the four-seat selection cap
//! - **Ticket store**: booking and cancellation as the only mutations, with a
//!   simulated network round trip and all-or-nothing validation
//! - **Directory**: route and bus lookups and case-insensitive route search
//! - **Temporal engine**: journey duration, progress, arrival estimates, ticket
//!   timing and simulated GPS drift, all as pure functions of `now`
//!
//! # Architecture
//!
//! ```text
//!   BusTicketingApp ──► AuthService ──► SessionStore (busUser)
//!        │
//!        ├──► Store<TicketState> ── TicketReducer ── Delay ─► TicketBooked
//!        │                                          ├► TicketCancelled
//!        │                                          └► RequestRejected
//!        │
//!        └──► Store<FleetState>  ── FleetReducer ◄── ticker (Tick every 10s)
//! ```
//!
//! Each store has a single writer: the reducer runs under the store's write
//! lock, so bookings, cancellations and position ticks never interleave
//! mid-mutation. Outcomes are reduced before they are handed to the waiting
//! caller, so a caller awaiting `book_ticket` reads its own write.
//!
//! # Usage
//!
//! ```ignore
//! let app = BusTicketingApp::new(Config::from_env());
//! app.auth().login("user@example.com", "password").await?;
//! let ticket = app.book_ticket(&RouteId::new("route-1"), &["A3", "A4"], "2025-06-01").await?;
//! assert_eq!(ticket.price.to_string(), "$90.00");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregates;
pub mod app;
pub mod config;
pub mod directory;
pub mod error;
pub mod seats;
pub mod seed;
pub mod session;
pub mod temporal;
pub mod types;

pub use aggregates::{FleetAction, FleetReducer, StatusFilter, TicketAction, TicketReducer};
pub use app::{BusTicketingApp, BusTracking, DashboardStats, Dependencies};
pub use config::Config;
pub use directory::Directory;
pub use error::{AppError, AuthError, BookingError, ParseError, SeatSelectionError};
pub use types::*;
