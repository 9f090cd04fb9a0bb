//! HTTP service for business growth potential predictions

pub mod api;
pub mod config;
pub mod error;
