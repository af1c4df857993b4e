//! Database access for the BOQ service
//!
//! Query modules over the shared Sitebill schema. Pool initialization and
//! table creation live in `sitebill_common::db`.

pub mod activities;
pub mod boqs;
pub mod phases;
pub mod projects;
