//! Multi-row writes that must be atomic.
//!
//! Every function here opens its own `IMMEDIATE` transaction, so the caller
//! passes `&mut Connection` and never holds a transaction across awaits.

pub mod mint;
pub mod social;
