//! Keyshelf - license key inventory and subscription back-office
//!
//! This library provides the license key store, subscription status
//! derivation, and purchase intent ingestion for a digital-goods storefront,
//! plus the HTTP handlers that expose them to the admin dashboard.

pub mod config;
pub mod db;
pub mod error;
pub mod expiry;
pub mod extractors;
pub mod handlers;
pub mod intents;
pub mod middleware;
pub mod models;
pub mod subscriptions;
pub mod util;
