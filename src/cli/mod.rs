//! Command implementations for the routepool binary
//!
//! # Usage
//!
//! ```bash
//! # Fetch one or more URLs through the pool
//! routepool get https://www.example.com/ http://localhost:8080/health
//!
//! # Drive 30 concurrent units of 50 requests each against one URL
//! routepool bench https://www.example.com/s?word=java --units 30 --requests 50
//!
//! # Print the effective configuration
//! routepool config
//! ```

pub mod commands;
