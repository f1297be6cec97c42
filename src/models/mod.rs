// src/models/mod.rs

pub mod challenge;
pub mod protocol;
pub mod question;
pub mod result;
pub mod room;
