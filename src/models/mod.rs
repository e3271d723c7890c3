// src/models/mod.rs

pub mod activity;
pub mod attempt;
pub mod exam;
pub mod question;
pub mod user;
