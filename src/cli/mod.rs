//! Operator commands run from the terminal against the local database.

pub mod clients;
pub mod doctor;
pub mod search;
pub mod seed;
