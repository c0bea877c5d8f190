// SPDX-License-Identifier: MIT

//! Veloclub: authentication core for a cycling-club activity tracker.
//!
//! This crate provides the Strava OAuth flow (web and mobile), the session
//! cookie store, bearer credential issuing/verification, and provider token
//! lifecycle management. Activity and club features consume the
//! authenticated identity through the persistence seam in [`db`].

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;

use std::sync::Arc;

use config::Config;
use db::UserGateway;
use services::StravaService;
use session::SessionStore;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub users: Arc<dyn UserGateway>,
    pub strava: StravaService,
}
