// Camera access, media streams and the video surface they render into

use crate::error::{MoodDetectorError, Result};
use crate::models::Frame;
use crate::playback::{PlaybackEvent, PlaybackEvents};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

/// Capabilities requested from the camera
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl MediaConstraints {
    /// Video only, no resolution or frame-rate constraints
    pub fn video_only() -> Self {
        Self {
            video: true,
            audio: false,
        }
    }
}

/// A live camera stream. Dropping it releases the device.
pub trait MediaStream: Send + Sync {
    /// Human readable device name
    fn label(&self) -> &str;

    /// Latest decoded frame, `None` until the first frame arrives
    fn frames(&self) -> watch::Receiver<Option<Frame>>;
}

/// Grants access to camera streams
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Requests a stream; fails with `CameraAccess` when denied or unavailable
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<Box<dyn MediaStream>>;
}

/// Surface a stream is rendered into
pub trait VideoSurface: Send + Sync {
    /// Makes the surface visible
    fn show(&self);

    fn is_visible(&self) -> bool;

    /// Binds `stream` as the source, replacing and releasing any previous one
    fn attach_stream(&self, stream: Box<dyn MediaStream>) -> Result<()>;

    /// Playback transitions of this surface
    fn playback(&self) -> &PlaybackEvents;

    /// Frame currently displayed
    fn current_frame(&self) -> Option<Frame>;
}

/// Video surface that starts playing when its stream delivers a first frame
pub struct VideoElement {
    visible: AtomicBool,
    source: Mutex<Option<Box<dyn MediaStream>>>,
    events: PlaybackEvents,
}

impl VideoElement {
    /// Creates a hidden VideoElement with no source
    pub fn new() -> Self {
        Self {
            visible: AtomicBool::new(false),
            source: Mutex::new(None),
            events: PlaybackEvents::new(),
        }
    }

    pub fn has_source(&self) -> bool {
        self.source.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

impl Default for VideoElement {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSurface for VideoElement {
    fn show(&self) {
        self.visible.store(true, Ordering::SeqCst);
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    fn attach_stream(&self, stream: Box<dyn MediaStream>) -> Result<()> {
        let mut frames = stream.frames();
        let events = self.events.clone();
        info!("Attaching stream from {}", stream.label());

        {
            let mut source = self.source.lock().map_err(|_| {
                MoodDetectorError::CameraAccess("video surface lock poisoned".to_string())
            })?;
            // Replacing the source drops the previous stream
            *source = Some(stream);
        }

        tokio::spawn(async move {
            let started = frames.wait_for(|frame| frame.is_some()).await.is_ok();
            if started {
                events.emit(PlaybackEvent::Playing);
            } else {
                warn!("Stream ended before delivering a frame");
                events.emit(PlaybackEvent::Ended);
            }
        });

        Ok(())
    }

    fn playback(&self) -> &PlaybackEvents {
        &self.events
    }

    fn current_frame(&self) -> Option<Frame> {
        let source = self.source.lock().ok()?;
        let frame = source.as_ref()?.frames().borrow().clone();
        frame
    }
}

#[cfg(feature = "native")]
pub use native::{CameraStream, NokhwaDevices};

#[cfg(feature = "native")]
mod native {
    use super::{MediaConstraints, MediaDevices, MediaStream};
    use crate::error::{MoodDetectorError, Result};
    use crate::models::Frame;
    use async_trait::async_trait;
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
    use nokhwa::Camera;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio::sync::{oneshot, watch};
    use tracing::{error, info, warn};

    /// Opens local cameras with nokhwa
    pub struct NokhwaDevices {
        preferred_index: u32,
    }

    impl NokhwaDevices {
        pub fn new(preferred_index: u32) -> Self {
            Self { preferred_index }
        }

        /// Lists available camera devices
        pub fn list_devices() -> Result<Vec<String>> {
            let devices = nokhwa::query(nokhwa::utils::ApiBackend::Auto).map_err(|e| {
                MoodDetectorError::CameraAccess(format!("Failed to query cameras: {e}"))
            })?;

            Ok(devices
                .iter()
                .map(|info| info.human_name().to_string())
                .collect())
        }

        // Some systems start at 0, others at 1
        fn open_camera(preferred_index: u32) -> Result<Camera> {
            let requested_format =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
            let fallback = if preferred_index == 0 { 1 } else { 0 };

            let mut camera = Camera::new(CameraIndex::Index(preferred_index), requested_format)
                .or_else(|_| Camera::new(CameraIndex::Index(fallback), requested_format))
                .map_err(|e| {
                    error!("Failed to open camera: {}", e);
                    MoodDetectorError::from(e)
                })?;
            camera.open_stream()?;
            Ok(camera)
        }
    }

    #[async_trait]
    impl MediaDevices for NokhwaDevices {
        async fn get_user_media(
            &self,
            constraints: MediaConstraints,
        ) -> Result<Box<dyn MediaStream>> {
            if !constraints.video {
                return Err(MoodDetectorError::CameraAccess(
                    "no video track requested".to_string(),
                ));
            }
            if constraints.audio {
                warn!("Audio capture is not supported, requesting video only");
            }

            let (opened_tx, opened_rx) = oneshot::channel();
            let (frame_tx, frame_rx) = watch::channel(None);
            let running = Arc::new(AtomicBool::new(true));
            let capture_running = running.clone();
            let preferred_index = self.preferred_index;

            // The camera handle is not Send, so it lives on its own thread
            std::thread::spawn(move || {
                let mut camera = match Self::open_camera(preferred_index) {
                    Ok(camera) => {
                        let _ = opened_tx.send(Ok(camera.info().human_name().to_string()));
                        camera
                    }
                    Err(e) => {
                        let _ = opened_tx.send(Err(e));
                        return;
                    }
                };
                capture_loop(&mut camera, &frame_tx, &capture_running);
                if let Err(e) = camera.stop_stream() {
                    error!("Error stopping camera stream: {}", e);
                }
            });

            let label = opened_rx.await.map_err(|_| {
                MoodDetectorError::CameraAccess("camera thread exited".to_string())
            })??;
            info!("Camera stream opened: {}", label);

            Ok(Box::new(CameraStream {
                label,
                frames: frame_rx,
                running,
            }))
        }
    }

    // Target 30 FPS (33.33ms per frame)
    fn capture_loop(
        camera: &mut Camera,
        frames: &watch::Sender<Option<Frame>>,
        running: &AtomicBool,
    ) {
        let frame_duration = Duration::from_millis(33);
        let mut last_frame_time = Instant::now();

        while running.load(Ordering::SeqCst) {
            let elapsed = last_frame_time.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
            last_frame_time = Instant::now();

            match camera.frame() {
                Ok(buffer) => match buffer.decode_image::<RgbFormat>() {
                    Ok(image) => {
                        let (width, height) = (image.width(), image.height());
                        frames.send_replace(Some(Frame::new(image.into_raw(), width, height)));
                    }
                    Err(e) => warn!("Failed to decode frame: {}", e),
                },
                Err(e) => {
                    error!("Failed to capture frame: {}", e);
                    continue;
                }
            }
        }
    }

    /// Stream backed by a capture thread
    pub struct CameraStream {
        label: String,
        frames: watch::Receiver<Option<Frame>>,
        running: Arc<AtomicBool>,
    }

    impl MediaStream for CameraStream {
        fn label(&self) -> &str {
            &self.label
        }

        fn frames(&self) -> watch::Receiver<Option<Frame>> {
            self.frames.clone()
        }
    }

    impl Drop for CameraStream {
        fn drop(&mut self) {
            self.running.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStream;

    #[tokio::test]
    async fn first_frame_starts_playback() {
        let surface = VideoElement::new();
        let (stream, feed) = FakeStream::new("test cam");
        let playing = surface.playback().once_playing();

        surface.attach_stream(Box::new(stream)).unwrap();
        assert!(surface.current_frame().is_none());

        feed.push(Frame::new(vec![0; 12], 2, 2));
        playing.wait().await.unwrap();
        assert_eq!(surface.current_frame().map(|f| f.width), Some(2));
    }

    #[tokio::test]
    async fn replacing_source_releases_previous_stream() {
        let surface = VideoElement::new();
        let (first, first_feed) = FakeStream::new("first");
        let (second, _second_feed) = FakeStream::new("second");

        surface.attach_stream(Box::new(first)).unwrap();
        surface.attach_stream(Box::new(second)).unwrap();

        assert!(surface.has_source());
        assert!(first_feed.is_released());
    }

    #[test]
    fn surface_starts_hidden() {
        let surface = VideoElement::new();
        assert!(!surface.is_visible());
        surface.show();
        assert!(surface.is_visible());
    }
}
