// src/handlers/mod.rs

pub mod attempts;
