pub mod activity;
pub mod csma;
pub mod engine;
pub mod fh;
pub mod frame;
pub mod pib;
pub mod queue;
pub mod security;
pub mod status;
pub mod timer_queue;

pub use engine::{Event, Platform, Ports, SharedTxEngine, TxEngine};
pub use frame::{FrameContext, FrameKind, TxClass, TxOptions};
pub use pib::Pib;
pub use status::TxStatus;
