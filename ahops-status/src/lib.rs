#![warn(missing_docs)]
//! Status values shared between the sync engine and whatever renders it.
//!
//! None of these types carry behaviour beyond their own transitions, so any number of readers may
//! hold copies while a single writer drives them forward.

pub mod connection_status;
pub mod fetch_state;
pub mod submission_status;
