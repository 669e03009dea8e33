//! Bus ticketing demo
//!
//! Walks one passenger journey through the engine:
//! - Log in as the demo passenger
//! - Pick seats on New York → Boston
//! - Book, track the bus, cancel
//! - Log in as admin and print the dashboard
//!
//! # Usage
//!
//! ```bash
//! BUSLINE_SIMULATED_LATENCY_MS=200 cargo run --bin busline-demo
//! ```

use busline::seats::{SeatSelection, SelectOutcome};
use busline::{BusId, BusTicketingApp, Config, RouteId, StatusFilter};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    let level = &config.logging.log_level;
                    format!("{level},busline=debug,busline_runtime=info").into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("\n=== Busline: Bus Ticketing Demo ===\n");

    let app = BusTicketingApp::new(config);
    let ticker = app.spawn_position_ticker();

    // Step 1: log in
    let user = app.auth().login("user@example.com", "password").await?;
    println!("1. Logged in as {} <{}>", user.name, user.email);

    // Step 2: find a route and pick seats
    let routes = app.filter_routes(Some("new york"), Some("boston"), None);
    let route = routes
        .first()
        .ok_or_else(|| anyhow::anyhow!("no New York to Boston route"))?;
    let travel_date = app.default_travel_date();
    println!(
        "2. {} → {} departs {} arrives {} ({}), {} per seat, travelling {travel_date}",
        route.from,
        route.to,
        route.departure_time,
        route.arrival_time,
        busline::temporal::journey_duration(route.departure_time, route.arrival_time),
        route.price,
    );

    let seat_map = app.seat_map(&route.id, travel_date).await?;
    println!("   {} of {} seats free", seat_map.available_count(), seat_map.layout().len());

    let mut selection = SeatSelection::new(app.config().booking.max_seats_per_booking);
    for code in ["A1", "A3", "A4"] {
        let outcome = seat_map.toggle(&mut selection, code.parse()?);
        let note = match outcome {
            SelectOutcome::Added => "added",
            SelectOutcome::Toggled => "removed",
            SelectOutcome::RejectedBooked => "already booked",
            SelectOutcome::RejectedLimit => "selection full",
        };
        println!("   seat {code}: {note}");
    }
    println!("   total {}", selection.total(route.price));

    // Step 3: book
    let ticket = app
        .book_ticket(&route.id, &selection.codes(), &travel_date.to_string())
        .await?;
    println!(
        "3. Booked {} for {} seat(s), {} [{}]",
        ticket.id,
        ticket.seat_numbers.len(),
        ticket.price,
        app.ticket_badge(&ticket)
    );

    // Step 4: track the bus
    if let Some(view) = app.tracking(&BusId::new("bus-1")).await {
        println!(
            "4. {} at {} is {}% along, ETA {}",
            view.bus.name,
            view.bus.current_location,
            view.progress_percent,
            view.eta.map_or_else(|| "unknown".to_string(), |eta| eta.to_string()),
        );
    }

    // Step 5: cancel
    if app.is_cancellable(&ticket) {
        app.cancel_ticket(&ticket.id).await?;
    }
    for t in app.user_tickets_filtered(StatusFilter::All, "").await {
        let badge = app.ticket_badge(&t);
        println!("5. {} {} → {} on {}: {badge}", t.id, t.from, t.to, t.travel_date);
    }

    // Step 6: admin dashboard
    app.auth().logout();
    app.auth().login("admin@example.com", "admin").await?;
    let stats = app.dashboard_stats().await?;
    println!(
        "6. Fleet: {} active, {} delayed of {} | {} routes | {} passengers | \
         {} booked today | revenue {}",
        stats.active_buses,
        stats.delayed_buses,
        stats.total_buses,
        stats.total_routes,
        stats.passengers,
        stats.bookings_today,
        stats.revenue,
    );

    let duplicate = app.book_ticket(&RouteId::new("route-1"), &["A1", "A1"], "2025-06-01").await;
    if let Err(error) = duplicate {
        println!("   duplicate seats rejected: {error}");
    }

    ticker.abort();
    app.shutdown(Duration::from_secs(5)).await?;
    println!("\n=== Demo Complete ===");
    Ok(())
}
