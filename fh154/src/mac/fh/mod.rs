//! Frequency hopping: the own broadcast and unicast slot schedule, the
//! unicast schedules of neighbors and the timing information elements that
//! carry schedules over the air.

pub mod ie;
pub mod neighbor;
pub mod slot;

pub use neighbor::{ChannelFunction, NeighborTable, UnicastSchedule};
pub use slot::{FhSlotSynchronizer, OutOfSlot, SlotPhase, SlotTransition};
