//! Socialnet - A small social network
//!
//! Members post public or friends-only messages, reply and react, keep a
//! friend list, exchange private messages and receive notifications.
//! Mini-apps reach the same data through an API-key protected external API.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod theme;
