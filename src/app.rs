//! Application Coordinator
//!
//! Owns the live session behind a lock, runs detection passes on a worker
//! thread one after another, and runs exports on a background thread.
//! Results from an image that has since been replaced are dropped by
//! generation number.

use anyhow::{anyhow, bail, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::classify::Classifier;
use crate::config::AppConfig;
use crate::fixture::{merge_into_archive, FixtureEntry, WriteOutcome};
use crate::shared::{ExportEvent, PassEvent, SharedSessionState};
use crate::vision::{self, PassKind, Size, TextDetector};

/// Drives a session through detection, classification and export
pub struct SessionController {
    /// Shared state between the controller and its callers
    pub shared_state: Arc<RwLock<SharedSessionState>>,
    detector: Arc<dyn TextDetector>,
    classifier: Arc<dyn Classifier>,
    /// Generation whose pass results are still wanted; 0 cancels everything
    live_generation: Arc<AtomicU64>,
    pass_tx: Sender<PassEvent>,
    pass_rx: Receiver<PassEvent>,
    export_tx: Sender<ExportEvent>,
    export_rx: Receiver<ExportEvent>,
    detection_handle: Option<JoinHandle<()>>,
    export_handle: Option<JoinHandle<()>>,
    /// Id of the most recently started export
    export_id: u64,
}

impl SessionController {
    pub fn new(
        config: AppConfig,
        detector: Arc<dyn TextDetector>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        let (pass_tx, pass_rx) = unbounded();
        let (export_tx, export_rx) = unbounded();

        Self {
            shared_state: Arc::new(RwLock::new(SharedSessionState::new(config))),
            detector,
            classifier,
            live_generation: Arc::new(AtomicU64::new(0)),
            pass_tx,
            pass_rx,
            export_tx,
            export_rx,
            detection_handle: None,
            export_handle: None,
            export_id: 0,
        }
    }

    /// Get current shared state
    pub fn state(&self) -> Arc<RwLock<SharedSessionState>> {
        self.shared_state.clone()
    }

    /// Start a session for a new image and schedule its passes.
    ///
    /// Any passes still running for a previous image are abandoned.
    pub fn pick_image(&mut self, image: Vec<u8>, content_size: Option<Size>) -> Result<u64> {
        let image_size = vision::image_size(&image)?;
        let content_size = content_size.unwrap_or(image_size);

        let (generation, passes) = {
            let mut state = self.shared_state.write();
            let generation = state.session.begin(image.clone(), image_size, content_size);
            state.runtime.is_detecting = true;
            state.runtime.completed_passes.clear();
            state.runtime.clear_error();

            let mut passes = state.config.detection.passes.clone();
            passes.sort();
            passes.dedup();
            (generation, passes)
        };
        self.live_generation.store(generation, Ordering::SeqCst);

        let detector = self.detector.clone();
        let live_generation = self.live_generation.clone();
        let tx = self.pass_tx.clone();

        let handle = std::thread::spawn(move || {
            debug!("Detection worker for generation {} starting", generation);
            for pass in passes {
                if live_generation.load(Ordering::SeqCst) != generation {
                    debug!("Generation {} superseded; stopping passes", generation);
                    return;
                }
                let event = match detector.detect(&image, pass) {
                    Ok(fragments) => PassEvent::PassCompleted {
                        generation,
                        pass,
                        fragments,
                    },
                    Err(e) => PassEvent::PassFailed {
                        generation,
                        pass,
                        error: e.to_string(),
                    },
                };
                let _ = tx.send(event);
            }
            let _ = tx.send(PassEvent::AllPassesCompleted { generation });
        });

        // The previous worker, if any, exits on its own after its current pass
        self.detection_handle = Some(handle);
        info!("Scheduled detection for generation {}", generation);
        Ok(generation)
    }

    /// Apply every pending pass event. Returns true if the current image
    /// finished detection during this call.
    pub fn pump(&self) -> bool {
        let mut finished = false;
        while let Ok(event) = self.pass_rx.try_recv() {
            finished |= self.handle_pass_event(event);
        }
        while let Ok(event) = self.export_rx.try_recv() {
            self.handle_export_event(event);
        }
        finished
    }

    /// Block until the current image finished detection and classification
    pub fn wait_for_completion(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.shared_state.read().runtime.is_detecting {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.pass_rx.recv_timeout(remaining) {
                Ok(event) => {
                    if self.handle_pass_event(event) {
                        return Ok(());
                    }
                }
                Err(RecvTimeoutError::Timeout) => bail!("Timed out waiting for detection passes"),
                Err(RecvTimeoutError::Disconnected) => bail!("Detection worker disconnected"),
            }
        }
    }

    fn handle_pass_event(&self, event: PassEvent) -> bool {
        let mut state = self.shared_state.write();
        if event.generation() != state.session.generation() {
            debug!("Dropping result from superseded generation {}", event.generation());
            return false;
        }

        match event {
            PassEvent::PassCompleted { pass, fragments, .. } => {
                info!("{} pass completed: {} fragments", pass.display_name(), fragments.len());
                state.session.record_pass(pass, fragments);
                state.runtime.completed_passes.push(pass);
                false
            }
            PassEvent::PassFailed { pass, error, .. } => {
                warn!("{} pass failed: {}", pass.display_name(), error);
                state.session.record_pass(pass, Vec::new());
                state.runtime.completed_passes.push(pass);
                false
            }
            PassEvent::AllPassesCompleted { .. } => {
                let passes: Vec<PassKind> = state.runtime.completed_passes.clone();
                state.session.reconcile(&passes);
                let output = self.classifier.classify(state.session.fragments_by_pass());
                state.session.apply_classification(Some(output));
                state.runtime.is_detecting = false;
                true
            }
        }
    }

    /// Re-project the session for a new viewport size
    pub fn relayout(&self, content_size: Size) {
        self.shared_state.write().session.relayout(content_size);
    }

    /// Export the session into the archive on a background thread. A
    /// previous export is waited for first.
    pub fn export_in_background(&mut self, archive_path: PathBuf) -> Result<()> {
        if let Some(handle) = self.export_handle.take() {
            let _ = handle.join();
        }

        let (entry, options) = {
            let mut state = self.shared_state.write();
            let entry = FixtureEntry::from_session(&state.session)
                .ok_or_else(|| anyhow!("No image has been picked"))?;
            state.runtime.is_exporting = true;
            (entry, state.config.export_options())
        };

        self.export_id += 1;
        let export_id = self.export_id;
        let tx = self.export_tx.clone();
        let handle = std::thread::spawn(move || {
            info!("Export {} to {}", export_id, archive_path.display());
            let event = match merge_into_archive(&archive_path, &entry, &options) {
                Ok(outcome) => ExportEvent::Finished { export_id, outcome },
                Err(e) => ExportEvent::Failed {
                    export_id,
                    error: format!("{:#}", anyhow::Error::new(e)),
                },
            };
            let _ = tx.send(event);
        });
        self.export_handle = Some(handle);
        Ok(())
    }

    /// Block until the most recently started export reports back. Reports
    /// of earlier exports still pending are applied on the way.
    pub fn wait_for_export(&self, timeout: Duration) -> Result<WriteOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = self
                .export_rx
                .recv_timeout(remaining)
                .map_err(|_| anyhow!("Timed out waiting for export"))?;
            if event.export_id() != self.export_id {
                self.handle_export_event(event);
                continue;
            }
            self.handle_export_event(event.clone());
            return match event {
                ExportEvent::Finished { outcome, .. } => Ok(outcome),
                ExportEvent::Failed { error, .. } => Err(anyhow!(error)),
            };
        }
    }

    fn handle_export_event(&self, event: ExportEvent) {
        let mut state = self.shared_state.write();
        if event.export_id() == self.export_id {
            state.runtime.is_exporting = false;
        }
        match event {
            ExportEvent::Finished { export_id, outcome } => {
                info!("Export {} finished: {:?}", export_id, outcome);
                state.runtime.last_export = Some(outcome);
            }
            ExportEvent::Failed { export_id, error } => {
                tracing::error!("Export {} failed: {}", export_id, error);
                state.runtime.set_error(error);
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        // Signal the detection worker to stop
        self.live_generation.store(0, Ordering::SeqCst);

        if let Some(handle) = self.detection_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.export_handle.take() {
            let _ = handle.join();
        }
    }
}
