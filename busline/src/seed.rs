//! Reference data the engine starts with: the timetable, the fleet, a few
//! historical tickets and the demo accounts.

use crate::seats::SeatLayout;
use crate::types::{
    Bus, BusId, BusStatus, GeoPosition, Money, Route, RouteId, SeatCode, Ticket, TicketId,
    TicketStatus, TimeOfDay, User, UserId,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Login email and password of a demo account
#[derive(Clone, Debug)]
pub struct DemoCredential {
    /// Login email
    pub email: &'static str,
    /// Plain-text demo password
    pub password: &'static str,
    /// Account the credentials unlock
    pub user: User,
}

fn time(hour: u8, minute: u8) -> TimeOfDay {
    TimeOfDay::new(hour, minute).unwrap_or(TimeOfDay::MIDNIGHT)
}

fn route(
    n: u8,
    from: &str,
    to: &str,
    dep: (u8, u8),
    arr: (u8, u8),
    dollars: u64,
    bus: u8,
) -> Route {
    Route {
        id: RouteId::new(format!("route-{n}")),
        from: from.to_string(),
        to: to.to_string(),
        departure_time: time(dep.0, dep.1),
        arrival_time: time(arr.0, arr.1),
        price: Money::from_dollars(dollars),
        bus_id: BusId::new(format!("bus-{bus}")),
    }
}

/// The ten scheduled routes
#[must_use]
pub fn routes() -> Vec<Route> {
    vec![
        route(1, "New York", "Boston", (8, 0), (12, 0), 45, 1),
        route(2, "Boston", "New York", (14, 0), (18, 0), 45, 2),
        route(3, "New York", "Washington DC", (9, 30), (13, 30), 55, 3),
        route(4, "Washington DC", "New York", (15, 0), (19, 0), 55, 4),
        route(5, "New York", "Philadelphia", (10, 0), (12, 0), 35, 5),
        route(6, "Philadelphia", "New York", (16, 0), (18, 0), 35, 6),
        route(7, "Boston", "Washington DC", (7, 30), (14, 0), 75, 7),
        route(8, "Washington DC", "Boston", (16, 30), (23, 0), 75, 8),
        route(9, "New York", "Atlantic City", (11, 0), (13, 30), 40, 1),
        route(10, "Atlantic City", "New York", (15, 30), (18, 0), 40, 2),
    ]
}

fn bus(n: u8, name: &str, capacity: u32, lat: f64, lng: f64, status: BusStatus) -> Bus {
    Bus {
        id: BusId::new(format!("bus-{n}")),
        name: name.to_string(),
        capacity,
        current_location: GeoPosition::new(lat, lng),
        status,
        layout: SeatLayout::reference(),
    }
}

/// The eight buses with their starting positions and statuses
#[must_use]
pub fn buses() -> Vec<Bus> {
    vec![
        bus(1, "Express Liner A1", 45, 40.7128, -74.006, BusStatus::InTransit),
        bus(2, "City Cruiser B2", 35, 40.7328, -73.9860, BusStatus::Delayed),
        bus(3, "Metro Transit C3", 40, 40.6928, -74.026, BusStatus::AtStation),
        bus(4, "Urban Connector D4", 38, 40.7528, -74.046, BusStatus::InTransit),
        bus(5, "Regional Express E5", 50, 40.7028, -73.986, BusStatus::Maintenance),
        bus(6, "Highway Voyager F6", 42, 40.7228, -74.026, BusStatus::InTransit),
        bus(7, "Night Rider G7", 36, 40.7428, -73.996, BusStatus::AtStation),
        bus(8, "Comfort Cruiser H8", 44, 40.7328, -74.016, BusStatus::InTransit),
    ]
}

fn seats(codes: &[&str]) -> Vec<SeatCode> {
    codes.iter().filter_map(|c| c.parse().ok()).collect()
}

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().unwrap_or_default()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

/// Tickets already on record when the engine starts
#[must_use]
pub fn tickets() -> Vec<Ticket> {
    vec![
        Ticket {
            id: TicketId::new("ticket-1"),
            user_id: UserId::new("1"),
            route_id: RouteId::new("route-1"),
            bus_id: BusId::new("bus-1"),
            seat_numbers: seats(&["A3", "A4"]),
            status: TicketStatus::Confirmed,
            booking_date: utc(2025, 5, 1, 10, 30),
            travel_date: date(2025, 5, 10),
            price: Money::from_dollars(90),
            from: "New York".into(),
            to: "Boston".into(),
            departure_time: time(8, 0),
            arrival_time: time(12, 0),
        },
        Ticket {
            id: TicketId::new("ticket-2"),
            user_id: UserId::new("1"),
            route_id: RouteId::new("route-3"),
            bus_id: BusId::new("bus-3"),
            seat_numbers: seats(&["B5"]),
            status: TicketStatus::Cancelled,
            booking_date: utc(2025, 5, 2, 14, 15),
            travel_date: date(2025, 5, 15),
            price: Money::from_dollars(55),
            from: "New York".into(),
            to: "Washington DC".into(),
            departure_time: time(9, 30),
            arrival_time: time(13, 30),
        },
        Ticket {
            id: TicketId::new("ticket-3"),
            user_id: UserId::new("2"),
            route_id: RouteId::new("route-2"),
            bus_id: BusId::new("bus-2"),
            seat_numbers: seats(&["C2", "C3", "C4"]),
            status: TicketStatus::Confirmed,
            booking_date: utc(2025, 5, 3, 9, 45),
            travel_date: date(2025, 5, 12),
            price: Money::from_dollars(135),
            from: "Boston".into(),
            to: "New York".into(),
            departure_time: time(14, 0),
            arrival_time: time(18, 0),
        },
    ]
}

/// The two demo accounts: a passenger and an administrator
#[must_use]
pub fn demo_credentials() -> Vec<DemoCredential> {
    vec![
        DemoCredential {
            email: "user@example.com",
            password: "password",
            user: User {
                id: UserId::new("1"),
                name: "Demo User".into(),
                email: "user@example.com".into(),
                is_admin: false,
            },
        },
        DemoCredential {
            email: "admin@example.com",
            password: "admin",
            user: User {
                id: UserId::new("2"),
                name: "Admin User".into(),
                email: "admin@example.com".into(),
                is_admin: true,
            },
        },
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_route_has_a_bus() {
        let bus_ids: HashSet<_> = buses().into_iter().map(|b| b.id).collect();
        for route in routes() {
            assert!(bus_ids.contains(&route.bus_id), "{} has no bus", route.id);
        }
    }

    #[test]
    fn seed_ticket_prices_match_routes() {
        let routes = routes();
        for ticket in tickets() {
            let route = routes.iter().find(|r| r.id == ticket.route_id).unwrap();
            let count = u32::try_from(ticket.seat_numbers.len()).unwrap();
            assert_eq!(ticket.price, route.price.saturating_multiply(count));
            assert_eq!(ticket.bus_id, route.bus_id);
        }
    }

    #[test]
    fn one_admin_account() {
        let admins: Vec<_> = demo_credentials().into_iter().filter(|c| c.user.is_admin).collect();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].user.id, UserId::new("2"));
    }
}
