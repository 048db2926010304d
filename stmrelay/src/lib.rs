//! # stmrelay - Live frame relay with still-image fallback
//!
//! Forwards still frames from a frame source to a rendering surface
//! according to the player state:
//!
//! - **FrameRelay**: the state machine (live / single frame / fallback / blank)
//! - **FrameSource** / **FramePort**: at most one open channel to the source
//! - **RenderSurface**: `draw_image` / `fill_rect` target, with an in-memory
//!   [`ImageSurface`]
//! - **FallbackImageLoader**: fetches the still of the loaded content
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stmrelay::{
//!     ChannelFrameSource, FrameRelay, HttpFallbackLoader, ImageSurface, PlayerState, RelayInput,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let (source, _feed) = ChannelFrameSource::new();
//! let relay = FrameRelay::new(ImageSurface::default(), Arc::new(source))
//!     .with_fallback_loader(Arc::new(HttpFallbackLoader::new()));
//!
//! let (tx, rx) = tokio::sync::mpsc::channel(16);
//! let handle = tokio::spawn(relay.run(rx));
//!
//! tx.send(RelayInput::ContentLoaded { video_id: "dQw4w9WgXcQ".into() }).await.ok();
//! tx.send(RelayInput::PlayerStateChanged { state: PlayerState::Playing, elapsed_secs: 0.0 })
//!     .await
//!     .ok();
//! drop(tx);
//! let _relay = handle.await;
//! # }
//! ```

mod error;
mod fallback;
mod frame;
mod port;
mod relay;
mod surface;

pub use error::{Error, Result};
pub use fallback::{
    FallbackImageLoader, HttpFallbackLoader, StaticFallbackLoader, DEFAULT_THUMBNAIL_BASE_URL,
};
pub use frame::Frame;
pub use port::{ChannelFrameSource, FrameFeed, FramePort, FrameSource, FRAME_PORT_NAME};
pub use relay::{
    FallbackResult, FrameRelay, PlayerState, PortMode, RelayEvent, RelayInput, RelayMode,
};
pub use surface::{ImageSurface, Rect, RenderSurface, BLANK_COLOR};
