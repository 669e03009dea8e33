//! Error types for booking, parsing and authentication.

use crate::types::{RouteId, TicketId};
use busline_runtime::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a seat selection cannot be booked
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeatSelectionError {
    /// No seats were selected
    #[error("no seats selected")]
    Empty,

    /// More seats than a single booking allows
    #[error("{count} seats selected, at most {max} allowed per booking")]
    TooMany {
        /// Seats requested
        count: usize,
        /// Per-booking limit
        max: usize,
    },

    /// The same seat appears more than once
    #[error("duplicate seats: {}", .codes.join(", "))]
    Duplicate {
        /// Repeated seat codes
        codes: Vec<String>,
    },

    /// Seats that do not exist on the bus
    #[error("seats not on this bus: {}", .codes.join(", "))]
    OutOfRange {
        /// Unknown or malformed seat codes
        codes: Vec<String>,
    },
}

/// Errors returned by booking and cancellation requests
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingError {
    /// No user is logged in
    #[error("you must be logged in to book tickets")]
    NotAuthenticated,

    /// The route does not exist
    #[error("route not found: {0}")]
    RouteNotFound(RouteId),

    /// The ticket does not exist
    #[error("ticket not found: {0}")]
    TicketNotFound(TicketId),

    /// The seat selection failed validation
    #[error("invalid seat selection: {0}")]
    InvalidSeatSelection(#[from] SeatSelectionError),

    /// The travel date could not be understood
    #[error("invalid travel date: {0}")]
    InvalidTravelDate(String),
}

/// Failure to parse a textual value object
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not a `<row letter><column>` seat code
    #[error("invalid seat code: {0:?}")]
    SeatCode(String),

    /// Not an `HH:MM` time
    #[error("invalid time of day: {0:?}")]
    TimeOfDay(String),

    /// Not a known bus status
    #[error("unknown bus status: {0:?}")]
    BusStatus(String),
}

/// Errors returned by the authentication service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Email and password did not match a known account
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The session record could not be written
    #[error("session error: {0}")]
    Session(String),
}

/// Errors surfaced by the application facade
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// A booking or cancellation was rejected
    #[error(transparent)]
    Booking(#[from] BookingError),

    /// Authentication failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The store could not process the request
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The operation is restricted to administrators
    #[error("administrator access required")]
    AdminRequired,

    /// A request was answered with an action that is not one of its outcomes
    #[error("unexpected outcome: {0}")]
    UnexpectedOutcome(String),
}
