// src/models/mod.rs

pub mod question;
pub mod quiz;
pub mod result;
pub mod status;
pub mod subject;
pub mod user;

pub use status::{EntityStatus, Role};
