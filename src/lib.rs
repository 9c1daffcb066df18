//! Media authenticity analysis service.
//!
//! Accepts image, video and audio-pair submissions, runs each through a
//! staged inference pipeline, persists a verdict per case and streams the
//! live queue of in-flight cases to websocket observers.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
