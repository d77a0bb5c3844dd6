pub mod adapters;
pub mod config;
pub mod error;
pub mod expiration;
pub mod web;
