//! API handlers module

pub mod collections;
pub mod documents;
pub mod health;
pub mod insights;
pub mod podcasts;
pub mod recommendations;
