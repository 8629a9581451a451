//! Authoritative staffing rules.
//!
//! Every worker clock transition, the timesheet finalization gate and
//! shift management rights are decided here. Handlers load state, call
//! into these functions and persist whatever they return; they never
//! re-implement a check of their own.

pub mod clock;
pub mod error;
pub mod fulfillment;
pub mod permissions;
pub mod store;
pub mod timesheet;

pub use error::StaffingError;
