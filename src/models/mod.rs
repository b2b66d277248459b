// src/models/mod.rs

pub mod attempt;
pub mod daily;
pub mod quiz;
pub mod user;
