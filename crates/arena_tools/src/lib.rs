//! # Arena Development Tools
//!
//! Command-line tools for development:
//! - Data validators for unit catalogs and battle configurations

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod validate;
