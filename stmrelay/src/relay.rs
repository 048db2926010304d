//! Frame relay: decides what the display shows
//!
//! Inputs are player state changes, content changes, fallback still loads
//! and frame messages. Depending on them the relay keeps at most one port
//! open to the frame source and draws either live frames, the fallback
//! still of the loaded content, or a blank placeholder.
//!
//! | Player state          | Port             | Drawn                       |
//! |-----------------------|------------------|-----------------------------|
//! | no content            | closed           | blank                       |
//! | playing               | open, continuous | every frame                 |
//! | paused, elapsed > 0   | open, one frame  | next frame, then port closes|
//! | paused, elapsed = 0   | closed           | fallback still, or blank    |

use crate::fallback::FallbackImageLoader;
use crate::frame::Frame;
use crate::port::{FramePort, FrameSource, FRAME_PORT_NAME};
use crate::surface::{RenderSurface, BLANK_COLOR};
use crate::{Error, Result};
use image::DynamicImage;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Player states reported to the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
}

/// What the relay is currently showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// No content: blank placeholder
    Idle,
    /// Paused before any playback, no usable still: blank placeholder
    PausedNoFrame,
    /// Paused before any playback: fallback still (or waiting for it)
    PausedWithFallbackImage { loaded: bool },
    /// Playing: every incoming frame is drawn
    PlayingLive,
    /// Paused mid-way: one frame requested from the source
    PausedSingleFrameRequested,
}

/// State of the frame port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortMode {
    Closed,
    OpenContinuous,
    OpenSingleFrame,
}

/// Inputs driving the relay
#[derive(Debug, Clone, PartialEq)]
pub enum RelayInput {
    /// New content loaded in the player; empty id means none
    ContentLoaded { video_id: String },
    /// Whether there is any active content at all (non-empty stream)
    ContentAvailable(bool),
    /// Player state change, with the playback position at that time
    PlayerStateChanged { state: PlayerState, elapsed_secs: f64 },
}

/// Everything the relay did, in order
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    ModeChanged(RelayMode),
    PortOpened(PortMode),
    PortClosed,
    /// Open while open, or close while closed (no-op)
    PortMisuse(String),
    FallbackRequested { video_id: String, generation: u64 },
    FallbackDiscarded { generation: u64 },
    FrameDrawn,
    /// A frame arrived on a closed port and was ignored
    FrameDiscarded,
    FallbackDrawn,
    BlankDrawn,
}

/// Result of a fallback load, tagged with the request it answers
pub struct FallbackResult {
    pub generation: u64,
    pub image: Result<DynamicImage>,
}

#[derive(Debug, Clone)]
enum Fallback {
    /// No content loaded
    Absent,
    Pending,
    Loaded(Arc<DynamicImage>),
    Failed,
}

/// Frame relay state machine
pub struct FrameRelay<S: RenderSurface> {
    surface: S,
    source: Arc<dyn FrameSource>,
    loader: Option<Arc<dyn FallbackImageLoader>>,

    mode: RelayMode,
    port: Option<FramePort>,
    port_mode: PortMode,

    player_state: PlayerState,
    elapsed_secs: f64,
    has_content: bool,

    fallback: Fallback,
    fallback_generation: u64,
    fallback_task: Option<JoinHandle<()>>,
    fallback_tx: mpsc::UnboundedSender<FallbackResult>,
    fallback_rx: mpsc::UnboundedReceiver<FallbackResult>,

    events: broadcast::Sender<RelayEvent>,
}

impl<S: RenderSurface> FrameRelay<S> {
    pub fn new(surface: S, source: Arc<dyn FrameSource>) -> Self {
        let (fallback_tx, fallback_rx) = mpsc::unbounded_channel();
        Self {
            surface,
            source,
            loader: None,
            mode: RelayMode::Idle,
            port: None,
            port_mode: PortMode::Closed,
            player_state: PlayerState::default(),
            elapsed_secs: 0.0,
            has_content: false,
            fallback: Fallback::Absent,
            fallback_generation: 0,
            fallback_task: None,
            fallback_tx,
            fallback_rx,
            events: broadcast::channel(256).0,
        }
    }

    /// Loads fallback stills automatically (needs a tokio runtime)
    ///
    /// Without a loader, callers answer each
    /// [`RelayEvent::FallbackRequested`] with [`FrameRelay::on_fallback_loaded`].
    pub fn with_fallback_loader(mut self, loader: Arc<dyn FallbackImageLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    pub fn mode(&self) -> RelayMode {
        self.mode
    }

    pub fn port_mode(&self) -> PortMode {
        self.port_mode
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Generation of the latest fallback request
    pub fn fallback_generation(&self) -> u64 {
        self.fallback_generation
    }

    pub fn fallback_loaded(&self) -> bool {
        matches!(self.fallback, Fallback::Loaded(_))
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    pub fn handle(&mut self, input: RelayInput) {
        tracing::trace!(?input, "Relay input");
        match input {
            RelayInput::ContentLoaded { video_id } => {
                self.request_fallback(video_id);
                // The frame captured at the paused position stays on screen
                if self.mode == RelayMode::PausedSingleFrameRequested {
                    return;
                }
            }
            RelayInput::ContentAvailable(available) => {
                self.has_content = available;
            }
            RelayInput::PlayerStateChanged {
                state,
                elapsed_secs,
            } => {
                self.player_state = state;
                self.elapsed_secs = elapsed_secs;
            }
        }
        self.render();
    }

    /// A frame message from the source
    pub fn on_frame(&mut self, message: &str) {
        match self.port_mode {
            PortMode::Closed => {
                tracing::trace!("Frame received on a closed port, discarded");
                self.emit(RelayEvent::FrameDiscarded);
            }
            PortMode::OpenContinuous => self.draw_frame(message),
            PortMode::OpenSingleFrame => {
                self.draw_frame(message);
                let _ = self.close_port();
            }
        }
    }

    /// The source closed the port on its side
    pub fn on_source_closed(&mut self) {
        if self.port_mode == PortMode::Closed {
            return;
        }
        tracing::debug!("Frame source closed the port");
        self.port = None;
        self.port_mode = PortMode::Closed;
        self.emit(RelayEvent::PortClosed);
        self.draw_blank();
    }

    /// Result of a fallback load; results of superseded requests are dropped
    pub fn on_fallback_loaded(&mut self, generation: u64, image: Result<DynamicImage>) {
        if generation != self.fallback_generation || !matches!(self.fallback, Fallback::Pending) {
            tracing::debug!(
                generation,
                current = self.fallback_generation,
                "Discarding superseded fallback image"
            );
            self.emit(RelayEvent::FallbackDiscarded { generation });
            return;
        }
        self.fallback_task = None;

        match image {
            Ok(image) => {
                self.fallback = Fallback::Loaded(Arc::new(image));
                if self.mode == (RelayMode::PausedWithFallbackImage { loaded: false }) {
                    self.draw_fallback();
                    self.set_mode(RelayMode::PausedWithFallbackImage { loaded: true });
                }
            }
            Err(e) => {
                tracing::warn!(generation, "Fallback image failed to load: {}", e);
                self.fallback = Fallback::Failed;
                if self.mode == (RelayMode::PausedWithFallbackImage { loaded: false }) {
                    self.draw_blank();
                    self.set_mode(RelayMode::PausedNoFrame);
                }
            }
        }
    }

    // ========================================================================
    // Port discipline
    // ========================================================================

    /// Opens the frame port; misuse is reported and ignored
    pub fn open_port(&mut self, mode: PortMode) -> Result<()> {
        if mode == PortMode::Closed {
            return self.close_port();
        }
        if self.port_mode != PortMode::Closed {
            return Err(self.misuse(Error::PortAlreadyConnected));
        }

        let port = self.source.connect(FRAME_PORT_NAME)?;
        tracing::debug!(port = port.name(), ?mode, "Frame port opened");
        self.port = Some(port);
        self.port_mode = mode;
        self.emit(RelayEvent::PortOpened(mode));
        Ok(())
    }

    /// Closes the frame port; misuse is reported and ignored
    pub fn close_port(&mut self) -> Result<()> {
        if self.port_mode == PortMode::Closed {
            return Err(self.misuse(Error::PortNotConnected));
        }

        // Dropping the receiver discards anything still in flight
        self.port = None;
        self.port_mode = PortMode::Closed;
        tracing::debug!("Frame port closed");
        self.emit(RelayEvent::PortClosed);
        Ok(())
    }

    fn misuse(&self, error: Error) -> Error {
        tracing::warn!("{}", error);
        self.emit(RelayEvent::PortMisuse(error.to_string()));
        error
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Drives the relay until `inputs` is closed, then closes the port
    pub async fn run(mut self, mut inputs: mpsc::Receiver<RelayInput>) -> Self {
        loop {
            tokio::select! {
                input = inputs.recv() => match input {
                    Some(input) => self.handle(input),
                    None => break,
                },
                Some(result) = self.fallback_rx.recv() => {
                    self.on_fallback_loaded(result.generation, result.image);
                }
                message = next_frame(&mut self.port) => match message {
                    Some(message) => self.on_frame(&message),
                    None => self.on_source_closed(),
                },
            }
        }

        if self.port_mode != PortMode::Closed {
            let _ = self.close_port();
        }
        if let Some(task) = self.fallback_task.take() {
            task.abort();
        }
        tracing::debug!("Frame relay stopped");
        self
    }

    // ========================================================================
    // Rendering policy
    // ========================================================================

    fn render(&mut self) {
        if !self.has_content {
            if self.port_mode != PortMode::Closed {
                let _ = self.close_port();
            }
            self.draw_blank();
            self.set_mode(RelayMode::Idle);
            return;
        }

        if self.player_state == PlayerState::Playing {
            match self.port_mode {
                PortMode::OpenContinuous => {}
                PortMode::OpenSingleFrame => {
                    let _ = self.close_port();
                    self.open_or_blank(PortMode::OpenContinuous);
                }
                PortMode::Closed => self.open_or_blank(PortMode::OpenContinuous),
            }
            self.set_mode(RelayMode::PlayingLive);
            return;
        }

        // Nothing streamed may draw over a paused display
        if self.port_mode != PortMode::Closed {
            let _ = self.close_port();
        }

        if self.elapsed_secs > 0.0 {
            self.open_or_blank(PortMode::OpenSingleFrame);
            self.set_mode(RelayMode::PausedSingleFrameRequested);
            return;
        }

        match self.fallback {
            Fallback::Loaded(_) => {
                self.draw_fallback();
                self.set_mode(RelayMode::PausedWithFallbackImage { loaded: true });
            }
            Fallback::Pending => {
                self.set_mode(RelayMode::PausedWithFallbackImage { loaded: false });
            }
            Fallback::Absent | Fallback::Failed => {
                self.draw_blank();
                self.set_mode(RelayMode::PausedNoFrame);
            }
        }
    }

    fn open_or_blank(&mut self, mode: PortMode) {
        if let Err(e) = self.open_port(mode) {
            if !e.is_misuse() {
                tracing::debug!("Frame source unavailable, showing blank: {}", e);
                self.draw_blank();
            }
        }
    }

    fn request_fallback(&mut self, video_id: String) {
        self.fallback_generation += 1;
        let generation = self.fallback_generation;

        if let Some(task) = self.fallback_task.take() {
            task.abort();
        }

        if video_id.trim().is_empty() {
            self.fallback = Fallback::Absent;
            return;
        }

        self.has_content = true;
        self.fallback = Fallback::Pending;
        tracing::debug!(video_id = %video_id, generation, "Requesting fallback image");
        self.emit(RelayEvent::FallbackRequested {
            video_id: video_id.clone(),
            generation,
        });

        let Some(loader) = self.loader.clone() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let tx = self.fallback_tx.clone();
                self.fallback_task = Some(runtime.spawn(async move {
                    let image = loader.load(&video_id).await;
                    let _ = tx.send(FallbackResult { generation, image });
                }));
            }
            Err(_) => {
                tracing::warn!("No tokio runtime, fallback image not loaded");
                self.fallback = Fallback::Failed;
            }
        }
    }

    // ========================================================================
    // Drawing
    // ========================================================================

    fn draw_frame(&mut self, message: &str) {
        match Frame::from_data_url(message) {
            Ok(frame) => {
                self.surface.draw_image(frame.image(), 0, 0, None);
                self.emit(RelayEvent::FrameDrawn);
            }
            Err(e) => {
                tracing::debug!("Unusable frame, showing blank: {}", e);
                self.draw_blank();
            }
        }
    }

    fn draw_fallback(&mut self) {
        if let Fallback::Loaded(image) = &self.fallback {
            let image = image.clone();
            let size = self.surface.size();
            self.surface.draw_image(&image, 0, 0, Some(size));
            self.emit(RelayEvent::FallbackDrawn);
        }
    }

    fn draw_blank(&mut self) {
        let bounds = self.surface.bounds();
        self.surface.fill_rect(bounds, BLANK_COLOR);
        self.emit(RelayEvent::BlankDrawn);
    }

    fn set_mode(&mut self, mode: RelayMode) {
        if self.mode != mode {
            tracing::debug!(from = ?self.mode, to = ?mode, "Relay mode changed");
            self.mode = mode;
            self.emit(RelayEvent::ModeChanged(mode));
        }
    }

    fn emit(&self, event: RelayEvent) {
        let _ = self.events.send(event);
    }
}

async fn next_frame(port: &mut Option<FramePort>) -> Option<String> {
    match port {
        Some(port) => port.recv().await,
        None => std::future::pending().await,
    }
}
