//! Client-side workflow library for the GG-WiFi captive portal.
//!
//! Covers the three cooperating pieces of the voucher-purchase flow:
//! payment initiation against the ZenoPay mobile-money gateway, interval
//! polling of the payment status endpoint, and restoration/heartbeat of an
//! active network session across page loads and MAC randomization.

pub mod api;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod poller;
pub mod session;
