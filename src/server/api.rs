//! HTTP endpoint implementation using rouille.
//!
//! # Key types
//!
//! - [`FrameMailbox`] - one-slot latest-frame handoff between driver and HTTP
//! - [`MailboxRenderer`] - [`Renderer`] that publishes each tick's model
//! - [`StreamServer`] - HTTP server runner, spawns a background thread
//! - [`PlayerCommand`] - commands sent to the driver (Pause, Resume, Stop)
//! - [`SharedState`] / [`StatusSnapshot`] - read-only status for GET handlers
//!
//! # Thread safety
//!
//! The mailbox holds a `Mutex<Option<Arc<Vec<u8>>>>`; the driver swaps the
//! `Arc` in, handlers clone it out, and neither side holds the lock across
//! serialization. `SharedState` uses `RwLock`: driver writes, handlers read.
//! Commands travel over `mpsc::Sender`, non-blocking for the handler.

use log::warn;
use rouille::{Request, Response};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, mpsc};
use std::thread;

use crate::model::RenderModel;
use crate::render::Renderer;

/// Commands sent from HTTP handlers to the driver thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    /// Hold the window; keep serving the last frame
    Pause,
    /// Resume advancing
    Resume,
    /// End the session
    Stop,
}

/// Single overwrite-on-write frame slot.
///
/// The driver publishes every tick; readers always get the newest published
/// frame. There is no queue: if nobody reads between two publishes, the
/// older frame is simply gone.
#[derive(Default)]
pub struct FrameMailbox {
    slot: Mutex<Option<Arc<Vec<u8>>>>,
    published: AtomicU64,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize and publish a render model, replacing whatever was there.
    /// A model that fails to encode leaves the previous frame in place.
    pub fn publish(&self, model: &RenderModel) {
        match serde_json::to_vec(model) {
            Ok(bytes) => {
                *self.slot.lock().unwrap() = Some(Arc::new(bytes));
                self.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!("render model failed to encode, frame not published: {}", e),
        }
    }

    /// Latest published frame, if any. Non-destructive; every reader sees
    /// the same newest frame until the next publish.
    pub fn latest(&self) -> Option<Arc<Vec<u8>>> {
        self.slot.lock().unwrap().clone()
    }

    /// Total publishes so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

/// Renderer that publishes each tick's model into a [`FrameMailbox`]
pub struct MailboxRenderer {
    mailbox: Arc<FrameMailbox>,
}

impl MailboxRenderer {
    pub fn new(mailbox: Arc<FrameMailbox>) -> Self {
        Self { mailbox }
    }
}

impl Renderer for MailboxRenderer {
    fn render(&mut self, model: &RenderModel) {
        self.mailbox.publish(model);
    }
}

/// Session status for API responses, updated by the driver each tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub clock: f64,
    pub window: (f64, f64),
    pub ticks: u64,
    /// "running" or "paused"
    pub state: String,
    pub boxes: usize,
    pub lines: usize,
    pub attribute_cache: usize,
    pub color_cache: usize,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            clock: 0.0,
            window: (0.0, 0.0),
            ticks: 0,
            state: "running".to_string(),
            boxes: 0,
            lines: 0,
            attribute_cache: 0,
            color_cache: 0,
        }
    }
}

/// Shared state readable by HTTP handlers (written by the driver)
#[derive(Default)]
pub struct SharedState {
    pub status: RwLock<StatusSnapshot>,
}

/// Generic API response
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn ok() -> Self {
        Self { success: true, message: None, error: None }
    }

    fn ok_msg(msg: &str) -> Self {
        Self { success: true, message: Some(msg.to_string()), error: None }
    }

    fn err(msg: &str) -> Self {
        Self { success: false, message: None, error: Some(msg.to_string()) }
    }
}

/// HTTP server for the frame stream and player control
pub struct StreamServer {
    port: u16,
    mailbox: Arc<FrameMailbox>,
    state: Arc<SharedState>,
    command_tx: mpsc::Sender<PlayerCommand>,
}

impl StreamServer {
    /// Start the server in a background thread.
    /// Returns the command receiver for the driver to poll.
    pub fn start(
        port: u16,
        mailbox: Arc<FrameMailbox>,
        state: Arc<SharedState>,
    ) -> mpsc::Receiver<PlayerCommand> {
        let (tx, rx) = mpsc::channel();

        let server = StreamServer { port, mailbox, state, command_tx: tx };

        thread::spawn(move || {
            server.run();
        });

        rx
    }

    fn run(self) {
        let addr = format!("0.0.0.0:{}", self.port);
        log::info!("stream server starting on http://{}", addr);

        let mailbox = self.mailbox;
        let state = self.state;
        let tx = self.command_tx;

        rouille::start_server(&addr, move |request| {
            Self::handle_request(request, &mailbox, &state, &tx)
        });
    }

    fn handle_request(
        request: &Request,
        mailbox: &Arc<FrameMailbox>,
        state: &Arc<SharedState>,
        tx: &mpsc::Sender<PlayerCommand>,
    ) -> Response {
        // Handle preflight
        if request.method() == "OPTIONS" {
            return Response::empty_204()
                .with_additional_header("Access-Control-Allow-Origin", "*")
                .with_additional_header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
                .with_additional_header("Access-Control-Allow-Headers", "Content-Type");
        }

        let response = rouille::router!(request,
            (GET) ["/api/frame"] => {
                Self::get_frame(mailbox)
            },
            (GET) ["/api/status"] => {
                Self::get_status(state)
            },

            // Player control
            (POST) ["/api/player/pause"] => {
                Self::send_command(tx, PlayerCommand::Pause)
            },
            (POST) ["/api/player/resume"] => {
                Self::send_command(tx, PlayerCommand::Resume)
            },
            (POST) ["/api/player/stop"] => {
                Self::send_command(tx, PlayerCommand::Stop)
            },

            // Health check
            (GET) ["/api/health"] => {
                Response::json(&ApiResponse::ok_msg("videowall stream server"))
            },

            // Fallback
            _ => {
                Response::json(&ApiResponse::err("Not found")).with_status_code(404)
            }
        );

        response.with_additional_header("Access-Control-Allow-Origin", "*")
    }

    fn get_frame(mailbox: &Arc<FrameMailbox>) -> Response {
        match mailbox.latest() {
            Some(bytes) => Response::from_data("application/json", bytes.as_ref().clone()),
            None => Response::json(&ApiResponse::err("No frame published yet"))
                .with_status_code(404),
        }
    }

    fn get_status(state: &Arc<SharedState>) -> Response {
        let status = state.status.read().unwrap().clone();
        Response::json(&status)
    }

    fn send_command(tx: &mpsc::Sender<PlayerCommand>, cmd: PlayerCommand) -> Response {
        match tx.send(cmd) {
            Ok(_) => Response::json(&ApiResponse::ok()),
            Err(e) => Response::json(&ApiResponse::err(&format!("Failed to send command: {}", e)))
                .with_status_code(500),
        }
    }
}
