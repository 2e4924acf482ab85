//! Patient display kiosk: keeps a reconciled doctors snapshot in sync with the
//! portal server and rotates it over the kiosk screen as HTML slides.
pub mod controller;
pub mod doctor_source;
pub mod errors;
pub mod events;
pub mod helpers;
pub mod merge;
pub mod models;
pub mod planner;
pub mod render;
pub mod run_tool;
pub mod surface;
