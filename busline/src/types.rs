//! Domain types for the bus ticketing engine.
//!
//! Value objects (identifiers, money, wall-clock times, seat codes) and the
//! three entities the engine manages: routes, buses and tickets.

use crate::error::ParseError;
use crate::seats::SeatLayout;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a `", stringify!($name), "` from any string")]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier text
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id! {
    /// Identifier of a scheduled route (`route-1`, ...)
    RouteId
}

string_id! {
    /// Identifier of a vehicle (`bus-1`, ...)
    BusId
}

string_id! {
    /// Identifier of a ticket record
    TicketId
}

string_id! {
    /// Identifier of a registered user
    UserId
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero dollars
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from whole dollars
    ///
    /// # Panics
    ///
    /// Panics if the conversion would overflow (dollars * 100 > `u64::MAX`).
    #[must_use]
    #[allow(clippy::panic)]
    pub const fn from_dollars(dollars: u64) -> Self {
        match dollars.checked_mul(100) {
            Some(cents) => Self(cents),
            None => panic!("Money::from_dollars overflow"),
        }
    }

    /// Multiplies money by a quantity, clamping at `u64::MAX` cents
    #[must_use]
    pub const fn saturating_multiply(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(quantity as u64))
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, m| Self(acc.0.saturating_add(m.0)))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Wall-clock time of day
// ============================================================================

/// A 24-hour wall-clock time, written `HH:MM`
///
/// Routes run on the same timetable every day, so departure and arrival
/// carry no date of their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    /// `00:00`
    pub const MIDNIGHT: Self = Self { hour: 0, minute: 0 };

    /// Build a time from hour (0-23) and minute (0-59)
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::TimeOfDay`] if either component is out of range.
    pub fn new(hour: u8, minute: u8) -> Result<Self, ParseError> {
        if hour > 23 || minute > 59 {
            return Err(ParseError::TimeOfDay(format!("{hour:02}:{minute:02}")));
        }
        Ok(Self { hour, minute })
    }

    /// Hour component
    #[must_use]
    pub const fn hour(&self) -> u8 {
        self.hour
    }

    /// Minute component
    #[must_use]
    pub const fn minute(&self) -> u8 {
        self.minute
    }

    /// Minutes elapsed since midnight
    #[must_use]
    pub const fn minutes_of_day(&self) -> u32 {
        self.hour as u32 * 60 + self.minute as u32
    }

    /// The same instant as a chrono `NaiveTime`
    #[must_use]
    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for TimeOfDay {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::TimeOfDay(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        if hour.len() != 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

// ============================================================================
// Seat codes
// ============================================================================

/// A seat label: row letter followed by a 1-based column number (`A3`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeatCode {
    row: char,
    column: u8,
}

impl SeatCode {
    /// Build a seat code from its parts
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::SeatCode`] unless `row` is an uppercase ASCII
    /// letter and `column` is at least 1.
    pub fn new(row: char, column: u8) -> Result<Self, ParseError> {
        if !row.is_ascii_uppercase() || column == 0 {
            return Err(ParseError::SeatCode(format!("{row}{column}")));
        }
        Ok(Self { row, column })
    }

    /// Row letter
    #[must_use]
    pub const fn row(&self) -> char {
        self.row
    }

    /// Column number, starting at 1
    #[must_use]
    pub const fn column(&self) -> u8 {
        self.column
    }
}

impl FromStr for SeatCode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::SeatCode(s.to_string());
        let mut chars = s.chars();
        let row = chars.next().ok_or_else(invalid)?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let column = digits.parse::<u8>().map_err(|_| invalid())?;
        Self::new(row, column).map_err(|_| invalid())
    }
}

impl TryFrom<String> for SeatCode {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SeatCode> for String {
    fn from(value: SeatCode) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SeatCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.column)
    }
}

// ============================================================================
// Routes
// ============================================================================

/// A scheduled daily service between two cities, operated by one bus
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Route identifier
    pub id: RouteId,
    /// Origin city
    pub from: String,
    /// Destination city
    pub to: String,
    /// Daily departure time
    pub departure_time: TimeOfDay,
    /// Daily arrival time
    pub arrival_time: TimeOfDay,
    /// Price of one seat
    pub price: Money,
    /// Vehicle operating this route
    pub bus_id: BusId,
}

// ============================================================================
// Buses
// ============================================================================

/// Geographic position in decimal degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    /// Latitude
    pub lat: f64,
    /// Longitude
    pub lng: f64,
}

impl GeoPosition {
    /// Creates a position
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for GeoPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lng)
    }
}

/// Operational status of a bus
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BusStatus {
    /// On the road
    InTransit,
    /// Parked at a station
    AtStation,
    /// On the road but running late
    Delayed,
    /// Out of service
    Maintenance,
}

impl BusStatus {
    /// Wire name (`in-transit`, `at-station`, ...)
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InTransit => "in-transit",
            Self::AtStation => "at-station",
            Self::Delayed => "delayed",
            Self::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for BusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-transit" => Ok(Self::InTransit),
            "at-station" => Ok(Self::AtStation),
            "delayed" => Ok(Self::Delayed),
            "maintenance" => Ok(Self::Maintenance),
            other => Err(ParseError::BusStatus(other.to_string())),
        }
    }
}

/// A vehicle in the fleet
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    /// Bus identifier
    pub id: BusId,
    /// Display name
    pub name: String,
    /// Advertised seat count (informational; bookable seats come from `layout`)
    pub capacity: u32,
    /// Last known position
    pub current_location: GeoPosition,
    /// Operational status
    pub status: BusStatus,
    /// Bookable seat grid
    pub layout: SeatLayout,
}

// ============================================================================
// Tickets
// ============================================================================

/// Lifecycle status of a ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Valid for travel
    Confirmed,
    /// Withdrawn by the holder
    Cancelled,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed => f.write_str("confirmed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// A booking of one or more seats on a route for a travel date
///
/// Route endpoints and times are copied in at booking time so a ticket
/// reads the same even if the timetable later changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket identifier
    pub id: TicketId,
    /// Holder
    pub user_id: UserId,
    /// Booked route
    pub route_id: RouteId,
    /// Bus operating the route
    pub bus_id: BusId,
    /// Seats in the order they were requested
    pub seat_numbers: Vec<SeatCode>,
    /// Lifecycle status
    pub status: TicketStatus,
    /// When the booking was made
    pub booking_date: DateTime<Utc>,
    /// Day of travel
    pub travel_date: NaiveDate,
    /// Route price times seat count
    pub price: Money,
    /// Origin city
    pub from: String,
    /// Destination city
    pub to: String,
    /// Departure time
    pub departure_time: TimeOfDay,
    /// Arrival time
    pub arrival_time: TimeOfDay,
}

impl Ticket {
    /// Whether the ticket is still valid
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.status == TicketStatus::Confirmed
    }

    /// Whether the ticket has been cancelled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status == TicketStatus::Cancelled
    }
}

// ============================================================================
// Users
// ============================================================================

/// A registered user as kept in the session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User identifier
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Login email
    pub email: String,
    /// Whether the user may open the admin dashboard
    pub is_admin: bool,
}
