// src/handlers/mod.rs

pub mod rooms;
pub mod ws;
