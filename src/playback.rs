// Playback events of a video surface and the one-shot "playing" subscription

use crate::error::{MoodDetectorError, Result};
use tokio::sync::broadcast;
use tracing::debug;

/// Playback transition of a video surface
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackEvent {
    Playing,
    Paused,
    Ended,
}

/// Fan-out of playback transitions to subscribers
#[derive(Debug, Clone)]
pub struct PlaybackEvents {
    sender: broadcast::Sender<PlaybackEvent>,
}

impl PlaybackEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    /// Publishes a transition; returns how many subscribers saw it
    pub fn emit(&self, event: PlaybackEvent) -> usize {
        debug!("Playback event {:?}", event);
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribes to the next `Playing` transition only.
    ///
    /// The subscription is dropped as soon as it fires, so later
    /// transitions on the same surface cannot reach it.
    pub fn once_playing(&self) -> PlayingOnce {
        PlayingOnce {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for PlaybackEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot subscription to the first `Playing` transition
#[derive(Debug)]
pub struct PlayingOnce {
    receiver: broadcast::Receiver<PlaybackEvent>,
}

impl PlayingOnce {
    /// Waits for `Playing`, then unsubscribes by consuming itself
    pub async fn wait(mut self) -> Result<()> {
        loop {
            match self.receiver.recv().await {
                Ok(PlaybackEvent::Playing) => return Ok(()),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Playback subscription skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(MoodDetectorError::CameraAccess(
                        "video surface closed before playback started".to_string(),
                    ))
                }
            }
        }
    }
}
