//! Synchronization between task context and interrupt context.
//!
//! All state of the scheduling core lives in a single context that is only
//! ever touched while interrupts are masked. There is exactly one way in:
//! [`IrqCell::lock`] which hands out an RAII guard.
pub mod irq_cell;

pub use irq_cell::*;
