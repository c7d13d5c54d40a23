mod client;
mod publisher;

pub use client::{connection_payload, parse_switch_request, stats_payload, DashboardClient};
pub use publisher::{publisher_loop, DashboardEvent, Publisher, MIN_SWITCH_POLL};
