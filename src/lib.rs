//! bunkd — a hostel booking daemon that speaks the Postgres wire protocol.
//!
//! Clients connect with any Postgres driver and manage users, hostels,
//! rooms, bookings and payments through a small SQL dialect. State is
//! kept in memory per tenant and made durable through an append-only
//! event log.

pub mod auth;
pub mod compactor;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod sql;
pub mod tenant;
pub mod tls;
pub mod wal;
pub mod wire;
