// SPDX-License-Identifier: MIT

//! Services module - OAuth and provider API logic.

pub mod oauth;
pub mod strava;

pub use strava::{StravaAthlete, StravaClient, StravaService};
