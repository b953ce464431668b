// src/core/mod.rs

pub mod framing;
pub mod sink;
