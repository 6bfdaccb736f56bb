//! HTTP sink and remote control for a running playback session.
//!
//! # Purpose
//!
//! Serves the latest render model as JSON and accepts player commands, so
//! external tools (dashboards, scripts, a browser canvas) can display and
//! drive playback without linking against the engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐       mpsc::channel         ┌──────────────────────┐
//! │   HTTP Server Thread    │  ──── PlayerCommand ──────▶ │   Driver Thread      │
//! │   (rouille)             │                             │   (playback loop)    │
//! │                         │                             │                      │
//! │  POST /api/player/pause │  ──▶ PlayerCommand::Pause ─▶│  loop.pause()        │
//! │  GET  /api/frame        │                             │                      │
//! └─────────────────────────┘                             └──────────────────────┘
//!          │                                                       │
//!          │  Arc<FrameMailbox> (one slot, latest wins)            │
//!          │◀──────────────── read latest ──── publish per tick ───│
//!          │  Arc<SharedState>  status snapshot                    │
//! ```
//!
//! - **rouille** - sync HTTP server, one thread, no async runtime
//! - **FrameMailbox** - single overwrite-on-write slot; a slow reader only
//!   ever costs itself frames, never blocks the driver
//! - **mpsc channel** - commands from HTTP handlers to the driver thread
//!
//! # Endpoints
//!
//! | Method | Path                  | Description                    |
//! |--------|-----------------------|--------------------------------|
//! | GET    | `/api/frame`          | Latest render model (JSON)     |
//! | GET    | `/api/status`         | Clock/window/cache snapshot    |
//! | GET    | `/api/health`         | Health check                   |
//! | POST   | `/api/player/pause`   | Pause playback                 |
//! | POST   | `/api/player/resume`  | Resume playback                |
//! | POST   | `/api/player/stop`    | Stop the session               |

mod api;

pub use api::{
    FrameMailbox, MailboxRenderer, PlayerCommand, SharedState, StatusSnapshot, StreamServer,
};
