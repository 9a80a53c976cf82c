//! Listener for observing generate and rerender passes.
//!
//! Emits lightweight events at each pipeline stage, enough for UI progress
//! indicators without copying matrices or pixel buffers.

use crate::session::RenderPhase;

/// Events emitted while a job runs.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    PhaseChanged { token: u64, phase: RenderPhase },

    /// STFT progress, reported at each yield point.
    FramesAnalyzed { token: u64, done: usize, total: usize },

    /// Rasterizer progress, reported at each yield point.
    TilesRasterized { token: u64, done: usize, total: usize },

    /// Results of this request are now the published state.
    Published { token: u64 },
}

impl std::fmt::Display for RenderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderEvent::PhaseChanged { token, phase } => write!(f, "#{token} -> {phase:?}"),
            RenderEvent::FramesAnalyzed { token, done, total } => {
                write!(f, "#{token} frames {done}/{total}")
            }
            RenderEvent::TilesRasterized { token, done, total } => {
                write!(f, "#{token} tiles {done}/{total}")
            }
            RenderEvent::Published { token } => write!(f, "#{token} published"),
        }
    }
}

/// Receives [`RenderEvent`]s.
pub trait RenderListener {
    fn on_event(&mut self, event: RenderEvent);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl RenderListener for NoopListener {
    fn on_event(&mut self, _event: RenderEvent) {}
}

impl<F: FnMut(RenderEvent)> RenderListener for F {
    fn on_event(&mut self, event: RenderEvent) {
        self(event)
    }
}
