//! Renderer seam between the engine and whatever draws the frames
//!
//! **Why**: The playback loop and the pipeline consumer both end a tick by
//! handing off a [`RenderModel`]; neither cares whether it goes to a GUI, an
//! HTTP mailbox or a log line. One small trait keeps the engine headless.
//!
//! **Used by**: main (driver loops), server (mailbox renderer), pipeline
//! consumer, tests
//!
//! Re-render requests (e.g. on resize) are satisfied by re-serving the last
//! model; the engine itself never redraws.

use log::{debug, info};

use crate::model::RenderModel;

/// Consumes one render model per tick. No return value; a renderer that
/// cannot keep up drops frames on its own terms.
pub trait Renderer {
    fn render(&mut self, model: &RenderModel);
}

impl<T: Renderer + ?Sized> Renderer for Box<T> {
    fn render(&mut self, model: &RenderModel) {
        (**self).render(model);
    }
}

/// Logs a one-line summary per tick, with a periodic info-level heartbeat.
pub struct LogRenderer {
    ticks: u64,
    /// Heartbeat period in ticks
    every: u64,
}

impl LogRenderer {
    pub fn new(every: u64) -> Self {
        Self { ticks: 0, every: every.max(1) }
    }
}

impl Renderer for LogRenderer {
    fn render(&mut self, model: &RenderModel) {
        self.ticks += 1;
        if self.ticks % self.every == 0 {
            info!(
                "t={:.3} window=[{:.3}, {:.3}] boxes={} lines={}",
                model.clock,
                model.window.0,
                model.window.1,
                model.boxes.len(),
                model.lines.len()
            );
        } else {
            debug!("t={:.3} boxes={} lines={}", model.clock, model.boxes.len(), model.lines.len());
        }
    }
}

/// Discards every model. Headless benchmarking and tests.
#[derive(Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _model: &RenderModel) {}
}
