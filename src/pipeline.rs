//! Decoupled producer/consumer pipeline over a bounded channel
//!
//! **Why**: The single-threaded playback loop couples fetch latency to draw
//! latency. The pipeline variant splits them: a producer thread drains the
//! frame cursor and serializes raw frames into a bounded channel, and the
//! consumer (on the caller's thread) decodes, resolves attributes through
//! its own private caches, and hands render models to a [`Renderer`].
//!
//! **Used by**: main (`--pipeline` mode), tests
//!
//! # Synchronization
//!
//! The bounded channel is the only synchronization point and its capacity is
//! the only backpressure mechanism: a full channel blocks the producer, an
//! empty one blocks the consumer. Nothing is ever dropped or rate-limited.
//! Caches live on the consumer side only; the producer ships raw frames.
//!
//! # Shutdown
//!
//! Cooperative, via the [`PipelineItem::Eos`] sentinel. The producer
//! enqueues it on cursor exhaustion and exits; the consumer stops on
//! receiving it. A consumer that goes away first disconnects the channel,
//! which the producer treats the same as exhaustion.
//!
//! # Pacing
//!
//! Consumption is externally gated: the caller invokes [`FrameConsumer::step`]
//! once per advance signal (timer tick, key press), so the consumer's rate is
//! decoupled from the producer's.

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, error, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crate::cache::BoundedAttributeCache;
use crate::config::Config;
use crate::model::{BoxGlyph, DisplayColor, RenderModel, VehicleAttributes, VehicleId};
use crate::render::Renderer;
use crate::source::{FrameSource, RawFrame};

/// One channel slot: a serialized raw frame, or the end-of-stream sentinel.
#[derive(Debug)]
pub enum PipelineItem {
    Frame(Vec<u8>),
    Eos,
}

/// Errors at the channel boundary
#[derive(Debug)]
pub enum PipelineError {
    /// The producer vanished without sending the sentinel
    Disconnected,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Disconnected => write!(f, "producer disconnected without sentinel"),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Produced/consumed item counts, shared across both sides
#[derive(Debug, Default)]
pub struct PipelineCounters {
    produced: AtomicUsize,
    consumed: AtomicUsize,
}

impl PipelineCounters {
    pub fn produced(&self) -> usize {
        self.produced.load(Ordering::Relaxed)
    }

    pub fn consumed(&self) -> usize {
        self.consumed.load(Ordering::Relaxed)
    }
}

/// Handle to a running producer thread plus the receiving end of the channel.
pub struct StreamingPipeline {
    items: Receiver<PipelineItem>,
    counters: Arc<PipelineCounters>,
    producer: Option<thread::JoinHandle<()>>,
}

impl StreamingPipeline {
    /// Spawn the producer thread over `source` with a channel of `capacity`
    /// slots. The producer runs until cursor exhaustion or disconnect.
    pub fn start<S>(source: S, capacity: usize) -> Self
    where
        S: FrameSource + Send + 'static,
    {
        let (tx, rx) = bounded(capacity.max(1));
        let counters = Arc::new(PipelineCounters::default());
        let produced = Arc::clone(&counters);
        let producer = thread::Builder::new()
            .name("videowall-producer".to_string())
            .spawn(move || run_producer(source, tx, produced))
            .expect("failed to spawn producer thread");
        info!("pipeline started, channel capacity {}", capacity.max(1));

        Self { items: rx, counters, producer: Some(producer) }
    }

    pub fn counters(&self) -> Arc<PipelineCounters> {
        Arc::clone(&self.counters)
    }

    /// Block for the next item.
    pub fn recv(&self) -> Result<PipelineItem, PipelineError> {
        self.items.recv().map_err(|_| PipelineError::Disconnected)
    }

    /// Join the producer thread. Call after the sentinel has been consumed.
    pub fn join(&mut self) {
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                error!("producer thread panicked");
            }
        }
    }
}

impl Drop for StreamingPipeline {
    fn drop(&mut self) {
        // dropping the receiver disconnects the channel; the producer sees
        // the send failure and exits its loop
        self.producer.take();
    }
}

fn run_producer<S: FrameSource>(
    mut source: S,
    tx: Sender<PipelineItem>,
    counters: Arc<PipelineCounters>,
) {
    loop {
        let raw = match source.next_frame() {
            Ok(Some(raw)) => raw,
            Ok(None) => break,
            Err(e) => {
                warn!("producer fetch failed, frame skipped: {}", e);
                continue;
            }
        };
        let payload = match serde_json::to_vec(&raw) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("frame at t={:.3} failed to encode, skipped: {}", raw.timestamp(), e);
                continue;
            }
        };
        // blocks while the channel is full; that block is the backpressure
        if tx.send(PipelineItem::Frame(payload)).is_err() {
            debug!("consumer gone, producer exiting");
            return;
        }
        counters.produced.fetch_add(1, Ordering::Relaxed);
    }
    let _ = tx.send(PipelineItem::Eos);
    info!("producer done after {} frames", counters.produced());
}

/// Outcome of one consumer step
#[derive(Debug)]
pub enum StepOutcome {
    Continue,
    EndOfStream,
}

/// Consumer side: decodes frames, resolves attributes and colors through its
/// own caches, renders. Overhead-only; the time-space strips belong to the
/// single-threaded loop.
pub struct FrameConsumer<R: Renderer> {
    pipeline: StreamingPipeline,
    renderer: R,
    attributes: BoundedAttributeCache<VehicleId, VehicleAttributes>,
    colors: BoundedAttributeCache<VehicleId, DisplayColor>,
    x_range: (f64, f64),
    window_size: f64,
    rng: StdRng,
}

impl<R: Renderer> FrameConsumer<R> {
    pub fn new(pipeline: StreamingPipeline, renderer: R, config: &Config) -> Self {
        Self {
            pipeline,
            renderer,
            attributes: BoundedAttributeCache::new(config.cache_capacity),
            colors: BoundedAttributeCache::new(config.cache_capacity),
            x_range: (config.x_min, config.x_max),
            window_size: config.window_size,
            rng: StdRng::from_entropy(),
        }
    }

    /// Block for the next item and render it. One call per advance signal.
    /// A frame that fails to decode is skipped, not fatal.
    pub fn step(&mut self) -> Result<StepOutcome, PipelineError> {
        match self.pipeline.recv()? {
            PipelineItem::Eos => {
                info!(
                    "end of stream after {} frames consumed",
                    self.pipeline.counters.consumed()
                );
                self.pipeline.join();
                Ok(StepOutcome::EndOfStream)
            }
            PipelineItem::Frame(payload) => {
                self.pipeline.counters.consumed.fetch_add(1, Ordering::Relaxed);
                match serde_json::from_slice::<RawFrame>(&payload) {
                    Ok(raw) => {
                        let model = self.build_model(raw);
                        self.renderer.render(&model);
                    }
                    Err(e) => warn!("undecodable frame skipped: {}", e),
                }
                Ok(StepOutcome::Continue)
            }
        }
    }

    fn build_model(&mut self, raw: RawFrame) -> RenderModel {
        let timestamp = raw.timestamp();
        let frame = match raw.normalize() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("malformed frame skipped: {}", e);
                return RenderModel {
                    clock: timestamp,
                    window: self.window_around(timestamp),
                    ..RenderModel::default()
                };
            }
        };

        if let Some(dims) = &frame.dimensions {
            for (id, d) in frame.ids.iter().zip(dims) {
                self.attributes.put(
                    id.clone(),
                    VehicleAttributes { length: d.length, width: d.width, class: None },
                );
            }
        }

        let mut boxes = Vec::with_capacity(frame.len());
        for (i, id) in frame.ids.iter().enumerate() {
            let (x, y) = frame.positions[i];
            if x < self.x_range.0 || x > self.x_range.1 {
                continue;
            }
            let Some(attrs) = self.attributes.get(id).copied() else {
                debug!("no attributes for {} at t={:.3}, box skipped", id, frame.timestamp);
                continue;
            };
            let color = match self.colors.get(id) {
                Some(c) => *c,
                None => {
                    let c = DisplayColor::random(&mut self.rng);
                    self.colors.put(id.clone(), c);
                    c
                }
            };
            boxes.push(BoxGlyph {
                id: id.clone(),
                x,
                y,
                length: attrs.length,
                width: attrs.width,
                color,
            });
        }

        RenderModel {
            clock: frame.timestamp,
            window: self.window_around(frame.timestamp),
            boxes,
            lines: Vec::new(),
        }
    }

    fn window_around(&self, t: f64) -> (f64, f64) {
        (t - self.window_size / 2.0, t + self.window_size / 2.0)
    }
}
