// src/handlers/mod.rs

pub mod activity;
pub mod auth;
pub mod exam;
pub mod question;
