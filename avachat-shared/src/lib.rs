#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
//! Models, wire payloads and configuration shared by the Avachat crates.

pub mod config;
pub mod models;
