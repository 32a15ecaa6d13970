//! Core components of the robot's perception/dialogue bridge: a PD
//! motion controller, face/audio perception and fusion, a tracking
//! loop, a realtime dialogue session, tool dispatch, and a small
//! person-memory store. Concrete device drivers (camera capture, motor
//! HTTP API, the dialogue service's wire transport) are injected by the
//! `eva` binary through the traits in [`robot`].

pub mod audio;
pub mod config;
pub mod error;
pub mod memory;
pub mod pd_controller;
pub mod perception;
pub mod realtime;
pub mod robot;
pub mod tools;
pub mod tracker;
pub mod tuning_api;
pub mod uplink;
pub mod world_model;

pub use config::{PdAxisConfig, Tuning, TuningPatch};
pub use pd_controller::PdController;
pub use tracker::Tracker;
pub use world_model::WorldModel;
