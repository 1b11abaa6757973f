//! State Module - Screen Security Decision Engine
//!
//! ## Structure
//! - `types`: `SecurityState`, `TransitionEvent`, `TransitionListener`
//! - `machine`: `SecurityStateMachine` (smoothing, escalation timer)

pub mod types;
pub mod machine;

pub use types::{
    SecurityState,
    StateSnapshot,
    TransitionCause,
    TransitionEvent,
    TransitionListener,
};

pub use machine::SecurityStateMachine;
