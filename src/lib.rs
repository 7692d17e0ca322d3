//! Balance Service - contract balance and modality allocation ledger.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
