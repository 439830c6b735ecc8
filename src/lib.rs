//! TrajectWatch: periodic travel-time polling for configured trajects.
//!
//! Each traject (an origin/destination pair) is polled in both directions on
//! its own interval. Every attempt lands in an append-only CSV log that the
//! query API reads back as a minute-aligned, bidirectional history.
//!
//! # Architecture
//!
//! * `trajectwatch_core`: configuration, error type and tracing setup
//! * `trajectwatch_protocol`: trajects, measurements and the other shared data types
//! * `trajectwatch_engine`: store, measurement log, scheduler, providers and HTTP API

pub use trajectwatch_core;
pub use trajectwatch_engine;
pub use trajectwatch_protocol;

pub use trajectwatch_engine::{
    EngineError, HistoryQuery, HistoryReader, HistoryView, MeasurementLog, RouteProvider,
    TrajectApiBuilder, TrajectScheduler, TrajectService, TrajectStore,
};
pub use trajectwatch_protocol::{Direction, Measurement, Snapshot, Traject, TrajectSpec, TravelMode};
