//! Error types for sifter-ui.

use thiserror::Error;

use crate::toolkit::{ControlHandle, ToolkitError};

/// All errors that can arise while projecting the registry onto controls.
#[derive(Debug, Error)]
pub enum ProjectError {
    /// Tera template engine error (bad label template or render failure).
    #[error("label template error: {0}")]
    Template(#[from] tera::Error),

    /// The rendering toolkit refused the request.
    #[error("toolkit error: {0}")]
    Toolkit(#[from] ToolkitError),

    /// An activation arrived for a control this projector does not hold.
    #[error("no control bound to handle {0}")]
    UnknownControl(ControlHandle),
}
