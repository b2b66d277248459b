// src/handlers/mod.rs

pub mod daily;
pub mod profile;
pub mod quiz;
