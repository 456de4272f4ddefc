//! Rendering toolkit seam: [`RenderToolkit`] trait and the in-process
//! [`TextToolkit`].

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Opaque handle to one materialized control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ControlHandle(pub u64);

impl fmt::Display for ControlHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctl-{}", self.0)
    }
}

/// Failures reported by a rendering toolkit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolkitError {
    #[error("toolkit rejected request for {requested} controls: {reason}")]
    Rejected { requested: usize, reason: String },

    #[error("toolkit returned {returned} handles for {requested} labels")]
    HandleCountMismatch { requested: usize, returned: usize },
}

/// Materializes labelled controls and releases them again.
///
/// Implementations must return exactly one handle per label, in label order.
pub trait RenderToolkit: Send {
    fn materialize(&mut self, labels: &[String]) -> Result<Vec<ControlHandle>, ToolkitError>;

    /// Release every control this toolkit has materialized.
    fn release_all(&mut self);
}

/// Toolkit that keeps materialized controls as text lines.
///
/// Used by the daemon to report visible controls; handles are never reused
/// across releases so stale handles cannot alias new controls.
#[derive(Debug, Default)]
pub struct TextToolkit {
    next_handle: u64,
    controls: Vec<(ControlHandle, String)>,
}

impl TextToolkit {
    /// Currently materialized labels, in display order.
    pub fn lines(&self) -> Vec<String> {
        self.controls.iter().map(|(_, label)| label.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

impl RenderToolkit for TextToolkit {
    fn materialize(&mut self, labels: &[String]) -> Result<Vec<ControlHandle>, ToolkitError> {
        let mut handles = Vec::with_capacity(labels.len());
        for label in labels {
            self.next_handle += 1;
            let handle = ControlHandle(self.next_handle);
            self.controls.push((handle, label.clone()));
            handles.push(handle);
        }
        Ok(handles)
    }

    fn release_all(&mut self) {
        self.controls.clear();
    }
}
