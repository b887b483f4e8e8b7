use std::sync::Arc;
use async_trait::async_trait;
use log::{debug, warn};

/// Handle to a status message that can be edited in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

/// Delivery mechanics for status text
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Replace the text of an existing status surface
    async fn update_in_place(&self, surface: SurfaceId, text: &str) -> anyhow::Result<()>;

    /// Emit a new standalone message, returning a handle to it
    async fn send_new(&self, text: &str) -> anyhow::Result<SurfaceId>;
}

/// Edit-else-send policy over a [`ProgressSink`]
///
/// Nothing here returns an error: progress reporting never aborts a job.
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    surface: Option<SurfaceId>,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>, surface: Option<SurfaceId>) -> Self {
        ProgressReporter { sink, surface }
    }

    pub fn sink(&self) -> Arc<dyn ProgressSink> {
        Arc::clone(&self.sink)
    }

    /// Surface subsequent updates will edit
    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    /// Show `text` on the status surface, adopting a new one if editing fails
    pub async fn report(&mut self, text: &str) {
        if let Some(surface) = self.surface {
            match self.sink.update_in_place(surface, text).await {
                Ok(()) => return,
                Err(e) => debug!("Status edit failed for {:?}, sending new: {}", surface, e),
            }
        }

        match self.sink.send_new(text).await {
            Ok(surface) => self.surface = Some(surface),
            Err(e) => {
                self.surface = None;
                warn!("Failed to send status message: {}", e);
            }
        }
    }

    /// Standalone message that leaves the status surface alone
    pub async fn notify(&self, text: &str) {
        if let Err(e) = self.sink.send_new(text).await {
            warn!("Failed to send message: {}", e);
        }
    }
}
