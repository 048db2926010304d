use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::Arc;
use std::time::Duration;
use stmrelay::{
    ChannelFrameSource, Error, Frame, FramePort, FrameRelay, FrameSource, ImageSurface,
    PlayerState, PortMode, Rect, RelayEvent, RelayInput, RelayMode, RenderSurface,
    StaticFallbackLoader, BLANK_COLOR,
};
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Clone, PartialEq)]
enum DrawCall {
    Image {
        width: u32,
        height: u32,
        scaled_to: Option<(u32, u32)>,
    },
    Fill(Rect, Rgba<u8>),
}

/// Surface that only records what it was asked to draw
#[derive(Default)]
struct RecordingSurface {
    calls: Vec<DrawCall>,
}

impl RenderSurface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        (640, 360)
    }

    fn draw_image(&mut self, image: &DynamicImage, _x: i64, _y: i64, size: Option<(u32, u32)>) {
        self.calls.push(DrawCall::Image {
            width: image.width(),
            height: image.height(),
            scaled_to: size,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) {
        self.calls.push(DrawCall::Fill(rect, color));
    }
}

/// Frame source that always refuses to connect
struct UnavailableSource;

impl FrameSource for UnavailableSource {
    fn connect(&self, _name: &str) -> stmrelay::Result<FramePort> {
        Err(Error::FrameSource("background page not running".into()))
    }
}

/// Logs shown with `cargo test -- --nocapture`, filtered by `RUST_LOG`
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn solid(width: u32, height: u32, color: [u8; 4]) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
}

fn frame_message() -> String {
    Frame::encode_data_url(&solid(16, 9, [10, 200, 10, 255])).unwrap()
}

fn playing() -> RelayInput {
    RelayInput::PlayerStateChanged {
        state: PlayerState::Playing,
        elapsed_secs: 0.0,
    }
}

fn paused(elapsed_secs: f64) -> RelayInput {
    RelayInput::PlayerStateChanged {
        state: PlayerState::Paused,
        elapsed_secs,
    }
}

fn loaded(video_id: &str) -> RelayInput {
    RelayInput::ContentLoaded {
        video_id: video_id.into(),
    }
}

fn recording_relay() -> FrameRelay<RecordingSurface> {
    init_tracing();
    let (source, _feed) = ChannelFrameSource::new();
    FrameRelay::new(RecordingSurface::default(), Arc::new(source))
}

fn drain(rx: &mut broadcast::Receiver<RelayEvent>) -> Vec<RelayEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn port_events(events: &[RelayEvent]) -> Vec<RelayEvent> {
    events
        .iter()
        .filter(|e| {
            matches!(
                e,
                RelayEvent::PortOpened(_)
                    | RelayEvent::PortClosed
                    | RelayEvent::FallbackDrawn
                    | RelayEvent::FrameDiscarded
            )
        })
        .cloned()
        .collect()
}

#[test]
fn test_play_then_pause_at_start_draws_fallback_after_close() {
    let mut relay = recording_relay();
    let mut events = relay.subscribe();

    relay.handle(loaded("v1"));
    relay.handle(playing());
    assert_eq!(relay.mode(), RelayMode::PlayingLive);
    assert_eq!(relay.port_mode(), PortMode::OpenContinuous);

    let generation = relay.fallback_generation();
    relay.on_fallback_loaded(generation, Ok(solid(320, 180, [1, 2, 3, 255])));

    relay.handle(paused(0.0));
    relay.on_frame(&frame_message());

    assert_eq!(
        port_events(&drain(&mut events)),
        vec![
            RelayEvent::PortOpened(PortMode::OpenContinuous),
            RelayEvent::PortClosed,
            RelayEvent::FallbackDrawn,
            RelayEvent::FrameDiscarded,
        ]
    );
    assert_eq!(
        relay.mode(),
        RelayMode::PausedWithFallbackImage { loaded: true }
    );
    assert_eq!(
        relay.surface().calls.last(),
        Some(&DrawCall::Image {
            width: 320,
            height: 180,
            scaled_to: Some((640, 360)),
        })
    );
}

#[test]
fn test_playing_draws_every_frame() {
    let mut relay = recording_relay();
    relay.handle(loaded("v1"));
    relay.handle(playing());

    for _ in 0..3 {
        relay.on_frame(&frame_message());
    }

    let frames = relay
        .surface()
        .calls
        .iter()
        .filter(|c| matches!(c, DrawCall::Image { scaled_to: None, .. }))
        .count();
    assert_eq!(frames, 3);
    assert_eq!(relay.port_mode(), PortMode::OpenContinuous);

    // A second "playing" notification keeps the same port
    let mut events = relay.subscribe();
    relay.handle(playing());
    assert!(port_events(&drain(&mut events)).is_empty());
}

#[test]
fn test_pause_mid_playback_requests_a_single_frame() {
    let mut relay = recording_relay();
    let mut events = relay.subscribe();

    relay.handle(loaded("v1"));
    relay.handle(playing());
    relay.handle(paused(42.5));

    assert_eq!(relay.mode(), RelayMode::PausedSingleFrameRequested);
    assert_eq!(relay.port_mode(), PortMode::OpenSingleFrame);

    relay.on_frame(&frame_message());
    assert_eq!(relay.port_mode(), PortMode::Closed);
    relay.on_frame(&frame_message());

    let events = drain(&mut events);
    assert_eq!(
        port_events(&events),
        vec![
            RelayEvent::PortOpened(PortMode::OpenContinuous),
            RelayEvent::PortClosed,
            RelayEvent::PortOpened(PortMode::OpenSingleFrame),
            RelayEvent::PortClosed,
            RelayEvent::FrameDiscarded,
        ]
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| **e == RelayEvent::FrameDrawn)
            .count(),
        1
    );
}

#[test]
fn test_new_content_keeps_the_paused_frame() {
    let mut relay = recording_relay();
    relay.handle(loaded("v1"));
    relay.handle(playing());
    relay.handle(paused(42.5));
    relay.on_frame(&frame_message());
    assert_eq!(relay.port_mode(), PortMode::Closed);
    let drawn = relay.surface().calls.len();

    let mut events = relay.subscribe();
    relay.handle(loaded("v2"));
    relay.on_frame(&frame_message());

    let events = drain(&mut events);
    assert_eq!(port_events(&events), vec![RelayEvent::FrameDiscarded]);
    assert!(events.iter().any(|e| matches!(
        e,
        RelayEvent::FallbackRequested { video_id, .. } if video_id == "v2"
    )));
    assert_eq!(relay.mode(), RelayMode::PausedSingleFrameRequested);
    assert_eq!(relay.surface().calls.len(), drawn);

    // The new still is kept for a later pause at the start
    relay.on_fallback_loaded(relay.fallback_generation(), Ok(solid(4, 4, [5, 5, 5, 255])));
    assert!(relay.fallback_loaded());
    assert_eq!(relay.surface().calls.len(), drawn);
}

#[test]
fn test_resuming_from_single_frame_switches_to_continuous() {
    let mut relay = recording_relay();
    relay.handle(loaded("v1"));
    relay.handle(paused(10.0));
    assert_eq!(relay.port_mode(), PortMode::OpenSingleFrame);

    let mut events = relay.subscribe();
    relay.handle(playing());

    assert_eq!(
        port_events(&drain(&mut events)),
        vec![
            RelayEvent::PortClosed,
            RelayEvent::PortOpened(PortMode::OpenContinuous),
        ]
    );
}

#[test]
fn test_waiting_for_fallback_draws_it_when_loaded() {
    let mut relay = recording_relay();
    relay.handle(loaded("v1"));
    relay.handle(paused(0.0));

    assert_eq!(
        relay.mode(),
        RelayMode::PausedWithFallbackImage { loaded: false }
    );
    assert!(relay.surface().calls.is_empty());

    relay.on_fallback_loaded(relay.fallback_generation(), Ok(solid(4, 4, [9, 9, 9, 255])));

    assert_eq!(
        relay.mode(),
        RelayMode::PausedWithFallbackImage { loaded: true }
    );
    assert_eq!(relay.surface().calls.len(), 1);
}

#[test]
fn test_failed_fallback_shows_blank() {
    let mut relay = recording_relay();
    relay.handle(loaded("v1"));
    relay.handle(paused(0.0));

    relay.on_fallback_loaded(
        relay.fallback_generation(),
        Err(Error::FallbackImage("404".into())),
    );

    assert_eq!(relay.mode(), RelayMode::PausedNoFrame);
    assert_eq!(
        relay.surface().calls,
        vec![DrawCall::Fill(Rect::new(0, 0, 640, 360), BLANK_COLOR)]
    );
}

#[test]
fn test_superseded_fallback_is_discarded() {
    let mut relay = recording_relay();
    relay.handle(loaded("v1"));
    let first = relay.fallback_generation();
    relay.handle(loaded("v2"));
    relay.handle(paused(0.0));

    relay.on_fallback_loaded(first, Ok(solid(4, 4, [1, 1, 1, 255])));
    assert!(!relay.fallback_loaded());
    assert!(relay.surface().calls.is_empty());

    relay.on_fallback_loaded(relay.fallback_generation(), Ok(solid(8, 8, [2, 2, 2, 255])));
    assert!(relay.fallback_loaded());
    assert_eq!(
        relay.surface().calls,
        vec![DrawCall::Image {
            width: 8,
            height: 8,
            scaled_to: Some((640, 360)),
        }]
    );
}

#[test]
fn test_no_content_is_idle_and_blank() {
    let mut relay = recording_relay();
    relay.handle(loaded("v1"));
    relay.handle(playing());

    relay.handle(RelayInput::ContentAvailable(false));

    assert_eq!(relay.mode(), RelayMode::Idle);
    assert_eq!(relay.port_mode(), PortMode::Closed);
    assert_eq!(
        relay.surface().calls.last(),
        Some(&DrawCall::Fill(Rect::new(0, 0, 640, 360), BLANK_COLOR))
    );
}

#[test]
fn test_port_misuse_is_reported_not_fatal() {
    let mut relay = recording_relay();
    let mut events = relay.subscribe();

    assert!(matches!(relay.close_port(), Err(Error::PortNotConnected)));
    relay.open_port(PortMode::OpenContinuous).unwrap();
    assert!(matches!(
        relay.open_port(PortMode::OpenSingleFrame),
        Err(Error::PortAlreadyConnected)
    ));
    assert_eq!(relay.port_mode(), PortMode::OpenContinuous);

    let misuses = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, RelayEvent::PortMisuse(_)))
        .count();
    assert_eq!(misuses, 2);
}

#[test]
fn test_unavailable_source_falls_back_to_blank() {
    init_tracing();
    let mut relay = FrameRelay::new(RecordingSurface::default(), Arc::new(UnavailableSource));
    relay.handle(loaded("v1"));
    relay.handle(playing());

    assert_eq!(relay.port_mode(), PortMode::Closed);
    assert_eq!(
        relay.surface().calls,
        vec![DrawCall::Fill(Rect::new(0, 0, 640, 360), BLANK_COLOR)]
    );
}

#[test]
fn test_invalid_frame_shows_blank() {
    let mut relay = recording_relay();
    relay.handle(loaded("v1"));
    relay.handle(playing());

    relay.on_frame("data:image/jpeg;base64,not-an-image");

    assert_eq!(
        relay.surface().calls,
        vec![DrawCall::Fill(Rect::new(0, 0, 640, 360), BLANK_COLOR)]
    );
    assert_eq!(relay.port_mode(), PortMode::OpenContinuous);
}

#[tokio::test]
async fn test_run_loop_relays_frames_and_loads_fallback() {
    init_tracing();
    let (source, feed) = ChannelFrameSource::new();
    let loader = StaticFallbackLoader::new().with_image("v1", solid(2, 2, [255, 0, 0, 255]));
    let relay = FrameRelay::new(ImageSurface::new(32, 18), Arc::new(source))
        .with_fallback_loader(Arc::new(loader));
    let mut events = relay.subscribe();

    let (tx, rx) = mpsc::channel(8);
    let handle = tokio::spawn(relay.run(rx));

    tx.send(loaded("v1")).await.unwrap();
    tx.send(paused(0.0)).await.unwrap();

    // Attendre le chargement du fallback
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(RelayEvent::FallbackDrawn)) => break,
            Ok(Ok(_)) => continue,
            other => panic!("fallback never drawn: {:?}", other),
        }
    }

    tx.send(playing()).await.unwrap();
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(RelayEvent::PortOpened(PortMode::OpenContinuous))) => break,
            Ok(Ok(_)) => continue,
            other => panic!("port never opened: {:?}", other),
        }
    }

    assert!(feed.is_connected());
    assert!(feed.publish(Frame::encode_data_url(&solid(32, 18, [0, 0, 255, 255])).unwrap()));
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(RelayEvent::FrameDrawn)) => break,
            Ok(Ok(_)) => continue,
            other => panic!("frame never drawn: {:?}", other),
        }
    }

    drop(tx);
    let relay = handle.await.unwrap();

    assert_eq!(relay.port_mode(), PortMode::Closed);
    assert!(!feed.is_connected());
    assert_eq!(
        relay.surface().pixel(16, 9),
        Some(Rgba([0, 0, 255, 255]))
    );
}
