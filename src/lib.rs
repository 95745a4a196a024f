//! Core library for the trial_daq application.
//!
//! Synchronized trial acquisition from three independent sources: a six-axis
//! force/torque sensor on a serial link, an inertial sensor and a video camera.
//! Each source runs in its own worker thread; the workers coordinate only
//! through a fixed set of shared [`signals`] and the [`channels`] to and from
//! the [`controller`].
//!
//! # Layout
//!
//! - [`adapters`] / [`instrument`]: serial transport and the sensor protocol driver
//! - [`hardware`]: device seams and simulated devices
//! - [`worker`] / [`sources`]: the per-sensor acquisition loop and trial file lifecycle
//! - [`storage`]: trial buffer, file naming and table writers
//! - [`session`]: wires everything together from [`config::Settings`]

pub mod adapters;
pub mod channels;
pub mod config;
pub mod controller;
pub mod core;
pub mod error;
pub mod hardware;
pub mod instrument;
pub mod session;
pub mod signals;
pub mod sources;
pub mod storage;
pub mod tracing_init;
pub mod worker;
