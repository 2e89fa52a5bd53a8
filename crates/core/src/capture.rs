//! Capture Coordinator
//!
//! Takes the souvenir photo at the moment a target is matched. The capture
//! runs on its own task so the game loop moves on to the next target
//! immediately; a missing subject or a failed capture is only logged.

use crate::snapshot::Region;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[async_trait]
pub trait PhotoCapture: Send + Sync {
    async fn capture(&self, label: &str, region: Region) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct CaptureCoordinator {
    camera: Arc<dyn PhotoCapture>,
}

impl CaptureCoordinator {
    pub fn new(camera: Arc<dyn PhotoCapture>) -> Self {
        Self { camera }
    }

    /// Starts a capture and returns immediately.
    ///
    /// Returns `None` when there was no subject to photograph.
    pub fn capture_async(&self, label: &str, region: Option<Region>) -> Option<JoinHandle<()>> {
        let Some(region) = region else {
            debug!(label, "no subject at capture instant, skipping photo");
            return None;
        };
        let camera = self.camera.clone();
        let label = label.to_string();
        Some(tokio::spawn(async move {
            if let Err(e) = camera.capture(&label, region).await {
                warn!(label = %label, error = ?e, "photo capture failed");
            }
        }))
    }
}
