// The "detect mood" control: loads models, then runs one capture session

use crate::cancel::CancellationToken;
use crate::error::{MoodDetectorError, Result};
use crate::loader::{ModelLoader, ModelNets};
use crate::session::{CaptureSession, SessionOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// The user-facing control that starts a detection
pub trait Control: Send + Sync {
    fn set_enabled(&self, enabled: bool);
}

/// Entry point of the flow, bound to one control and one session
pub struct DetectTrigger {
    control: Arc<dyn Control>,
    loader: ModelLoader,
    nets: Arc<dyn ModelNets>,
    session: CaptureSession,
    in_flight: AtomicBool,
    current: Mutex<Option<CancellationToken>>,
}

/// Clears the in-flight flag and re-enables the control, even on early return
struct InFlight<'a> {
    trigger: &'a DetectTrigger,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        {
            let mut current = self
                .trigger
                .current
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            *current = None;
            self.trigger.in_flight.store(false, Ordering::SeqCst);
        }
        self.trigger.control.set_enabled(true);
    }
}

impl DetectTrigger {
    /// Creates a new DetectTrigger
    pub fn new(
        control: Arc<dyn Control>,
        loader: ModelLoader,
        nets: Arc<dyn ModelNets>,
        session: CaptureSession,
    ) -> Self {
        Self {
            control,
            loader,
            nets,
            session,
            in_flight: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Handles one activation of the control.
    ///
    /// Returns `SessionBusy` if a previous activation has not reached a
    /// terminal state yet.
    pub async fn activate(&self) -> Result<SessionOutcome> {
        let token = self.begin()?;
        self.control.set_enabled(false);
        let _guard = InFlight { trigger: self };

        info!("Detect mood activated");
        // Shown before model loading
        self.session.show_surface();

        let models = match self.loader.load_models(self.nets.as_ref(), &token).await {
            Ok(models) => models,
            Err(e) => {
                self.session.fail(&e);
                return Ok(SessionOutcome::Failed(e));
            }
        };

        Ok(self.session.run(&models, &token).await)
    }

    /// Marks an activation in flight and publishes its token under the same lock
    fn begin(&self) -> Result<CancellationToken> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Detect mood ignored, a session is already running");
            return Err(MoodDetectorError::SessionBusy);
        }

        let token = CancellationToken::new();
        *current = Some(token.clone());
        Ok(token)
    }

    /// Cancels the in-flight activation, if any
    pub fn cancel(&self) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = current.as_ref() {
            info!("Cancelling mood detection");
            token.cancel();
        }
    }
}
