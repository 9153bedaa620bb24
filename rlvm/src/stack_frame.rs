//! Call-stack frames.

use std::sync::Arc;

use reallive::{ElementHandle, Scenario};

/// Why a frame was pushed. Returns must match their push: a `ret` only
/// pops a [`FrameKind::Gosub`] frame and an `rtl` only pops a
/// [`FrameKind::FarCall`] frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The bottom frame the machine was constructed with.
    Root,
    /// Pushed by `farcall`.
    FarCall,
    /// Pushed by `gosub`.
    Gosub,
}

/// One frame of the call stack: the scenario being executed and the
/// instruction pointer into its element arena.
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// The scenario this frame executes. Scenarios are immutable after
    /// parsing and shared between frames.
    pub scenario: Arc<Scenario>,
    /// The instruction pointer; either a valid element or the scenario's
    /// end sentinel.
    pub ip: ElementHandle,
    /// The frame kind, checked on return.
    pub kind: FrameKind,
}

impl StackFrame {
    /// Builds a frame.
    pub fn new(scenario: Arc<Scenario>, ip: ElementHandle, kind: FrameKind) -> Self {
        Self { scenario, ip, kind }
    }
}
