//! Instrument protocol drivers.
//!
//! Drivers speak a device's command language over a
//! [`LineTransport`](crate::adapters::LineTransport) and know nothing about
//! trials, files or signals.

pub mod ati_mini40;

pub use ati_mini40::{handshake_steps, parse_frame, AtiMini40};
