//! Seat inventory: bus seat grids, booked/selected classification and
//! the rules for building a valid selection.
//!
//! A [`SeatSelection`] is the client-side cart used while picking seats;
//! [`validate_selection`] is the authoritative check applied when a booking
//! request reaches the ticket store.

use crate::error::SeatSelectionError;
use crate::types::{Money, SeatCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Default per-booking seat limit
pub const MAX_SEATS_PER_BOOKING: usize = 4;

/// Seats shown as occupied on every route regardless of live bookings
pub const DEMO_BOOKED_SEATS: [&str; 8] = ["A1", "A2", "B3", "C5", "D6", "D7", "B8", "C9"];

/// The grid of bookable seats on a bus: row letters by numbered columns
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatLayout {
    rows: Vec<char>,
    columns: u8,
}

impl SeatLayout {
    /// Creates a layout from its row letters and column count
    ///
    /// Rows that are not uppercase ASCII letters are dropped.
    #[must_use]
    pub fn new(rows: impl IntoIterator<Item = char>, columns: u8) -> Self {
        Self {
            rows: rows.into_iter().filter(char::is_ascii_uppercase).collect(),
            columns,
        }
    }

    /// The 4 x 10 grid (rows A-D, columns 1-10) used by every seeded bus
    #[must_use]
    pub fn reference() -> Self {
        Self::new(['A', 'B', 'C', 'D'], 10)
    }

    /// Row letters, front to back
    #[must_use]
    pub fn rows(&self) -> &[char] {
        &self.rows
    }

    /// Number of columns per row
    #[must_use]
    pub const fn columns(&self) -> u8 {
        self.columns
    }

    /// Every seat, row by row
    #[must_use]
    pub fn seats(&self) -> Vec<SeatCode> {
        self.rows
            .iter()
            .flat_map(|&row| (1..=self.columns).filter_map(move |col| SeatCode::new(row, col).ok()))
            .collect()
    }

    /// Whether `seat` exists on this bus
    #[must_use]
    pub fn contains(&self, seat: &SeatCode) -> bool {
        self.rows.contains(&seat.row()) && seat.column() <= self.columns
    }

    /// Number of seats in the grid
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len() * usize::from(self.columns)
    }

    /// Whether the grid has no seats
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SeatLayout {
    fn default() -> Self {
        Self::reference()
    }
}

/// Display class of one seat
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatClass {
    /// Free to pick
    Available,
    /// Already taken
    Booked,
    /// In the current selection
    Selected,
}

/// Classify a seat against the booked set and the current selection
///
/// Booked wins over selected: a seat that became booked while it sat in the
/// selection is shown as booked.
#[must_use]
pub fn classify(seat: &SeatCode, booked: &BTreeSet<SeatCode>, selected: &[SeatCode]) -> SeatClass {
    if booked.contains(seat) {
        SeatClass::Booked
    } else if selected.contains(seat) {
        SeatClass::Selected
    } else {
        SeatClass::Available
    }
}

/// What happened when a seat was toggled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The seat was in the selection and has been removed
    Toggled,
    /// The seat has been added
    Added,
    /// The selection is full; nothing changed
    RejectedLimit,
    /// The seat is booked; nothing changed
    RejectedBooked,
}

impl SelectOutcome {
    /// Whether the selection changed
    #[must_use]
    pub const fn changed(self) -> bool {
        matches!(self, Self::Toggled | Self::Added)
    }
}

/// Seats picked for the next booking, in the order they were picked
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeatSelection {
    seats: Vec<SeatCode>,
    max: usize,
}

impl SeatSelection {
    /// An empty selection holding at most `max` seats
    #[must_use]
    pub const fn new(max: usize) -> Self {
        Self { seats: Vec::new(), max }
    }

    /// Toggle one seat
    ///
    /// Deselecting always succeeds. Selecting fails if the seat is booked,
    /// or if the selection already holds `max` seats.
    pub fn toggle(&mut self, seat: SeatCode, booked: &BTreeSet<SeatCode>) -> SelectOutcome {
        if let Some(pos) = self.seats.iter().position(|s| *s == seat) {
            self.seats.remove(pos);
            return SelectOutcome::Toggled;
        }
        if booked.contains(&seat) {
            return SelectOutcome::RejectedBooked;
        }
        if self.seats.len() >= self.max {
            return SelectOutcome::RejectedLimit;
        }
        self.seats.push(seat);
        SelectOutcome::Added
    }

    /// Selected seats in pick order
    #[must_use]
    pub fn seats(&self) -> &[SeatCode] {
        &self.seats
    }

    /// Seat labels, ready for a booking request
    #[must_use]
    pub fn codes(&self) -> Vec<String> {
        self.seats.iter().map(ToString::to_string).collect()
    }

    /// Number of selected seats
    #[must_use]
    pub fn len(&self) -> usize {
        self.seats.len()
    }

    /// Whether nothing is selected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    /// Whether `seat` is selected
    #[must_use]
    pub fn contains(&self, seat: &SeatCode) -> bool {
        self.seats.contains(seat)
    }

    /// Drop every selected seat
    pub fn clear(&mut self) {
        self.seats.clear();
    }

    /// Price of the selection at `unit_price` per seat
    #[must_use]
    pub fn total(&self, unit_price: Money) -> Money {
        unit_price.saturating_multiply(u32::try_from(self.seats.len()).unwrap_or(u32::MAX))
    }
}

impl Default for SeatSelection {
    fn default() -> Self {
        Self::new(MAX_SEATS_PER_BOOKING)
    }
}

/// Occupancy of one bus on one travel date
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeatMap {
    layout: SeatLayout,
    booked: BTreeSet<SeatCode>,
}

impl SeatMap {
    /// Creates a map; booked seats outside the layout are ignored
    #[must_use]
    pub fn new(layout: SeatLayout, booked: impl IntoIterator<Item = SeatCode>) -> Self {
        let booked = booked.into_iter().filter(|s| layout.contains(s)).collect();
        Self { layout, booked }
    }

    /// Seat grid
    #[must_use]
    pub const fn layout(&self) -> &SeatLayout {
        &self.layout
    }

    /// Seats already taken
    #[must_use]
    pub const fn booked(&self) -> &BTreeSet<SeatCode> {
        &self.booked
    }

    /// Whether `seat` is taken
    #[must_use]
    pub fn is_booked(&self, seat: &SeatCode) -> bool {
        self.booked.contains(seat)
    }

    /// Seats still free
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.layout.len() - self.booked.len()
    }

    /// Every seat with its display class, row by row
    #[must_use]
    pub fn entries(&self, selection: &SeatSelection) -> Vec<(SeatCode, SeatClass)> {
        self.layout
            .seats()
            .into_iter()
            .map(|seat| {
                let class = classify(&seat, &self.booked, selection.seats());
                (seat, class)
            })
            .collect()
    }

    /// Toggle `seat` in `selection` against this map's booked set
    pub fn toggle(&self, selection: &mut SeatSelection, seat: SeatCode) -> SelectOutcome {
        selection.toggle(seat, &self.booked)
    }
}

/// The demo seats shown as booked on every route
#[must_use]
pub fn demo_booked_seats() -> Vec<SeatCode> {
    DEMO_BOOKED_SEATS.iter().filter_map(|s| s.parse().ok()).collect()
}

/// Validate raw seat labels for a booking on a bus with `layout`
///
/// Checks, in order: the list is non-empty, it holds at most `max` entries,
/// no label repeats, and every label names a seat on the bus. Seats come
/// back parsed, in request order.
///
/// # Errors
///
/// Returns the first [`SeatSelectionError`] that applies.
pub fn validate_selection(
    layout: &SeatLayout,
    codes: &[String],
    max: usize,
) -> Result<Vec<SeatCode>, SeatSelectionError> {
    if codes.is_empty() {
        return Err(SeatSelectionError::Empty);
    }
    if codes.len() > max {
        return Err(SeatSelectionError::TooMany {
            count: codes.len(),
            max,
        });
    }

    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for code in codes {
        let key = code.trim();
        if !seen.insert(key) && !duplicates.iter().any(|d: &String| d == key) {
            duplicates.push(key.to_string());
        }
    }
    if !duplicates.is_empty() {
        return Err(SeatSelectionError::Duplicate { codes: duplicates });
    }

    let mut seats = Vec::with_capacity(codes.len());
    let mut out_of_range = Vec::new();
    for code in codes {
        match code.trim().parse::<SeatCode>() {
            Ok(seat) if layout.contains(&seat) => seats.push(seat),
            _ => out_of_range.push(code.trim().to_string()),
        }
    }
    if !out_of_range.is_empty() {
        return Err(SeatSelectionError::OutOfRange {
            codes: out_of_range,
        });
    }

    Ok(seats)
}
