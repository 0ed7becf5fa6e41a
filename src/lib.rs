// src/lib.rs

pub mod api;
pub mod attempt;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod utils;
