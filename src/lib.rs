//! An SMTP relay that advertises `AUTH LOGIN` alongside `AUTH PLAIN`.
//!
//! Some servers accept `LOGIN` but only advertise `PLAIN`, leaving clients
//! that only know `LOGIN` unable to authenticate. Sitting between the two,
//! this relay passes everything through untouched apart from the EHLO reply,
//! where `250-AUTH PLAIN` becomes `250-AUTH PLAIN LOGIN`.

pub mod config;
pub mod controller;
pub mod error;
pub mod listener;
pub mod logging;
pub mod proxy;
pub mod traits;

pub use tracing;
