//! Registry → control projection.
//!
//! Bindings are derived state: they are rebuilt on every [`UiProjector::project`]
//! and dropped on [`UiProjector::release`]. Nothing here decides whether a
//! sifter exists; the registry does.

use serde::Serialize;

use sifter_core::{Sifter, SifterId};

use crate::error::ProjectError;
use crate::label::LabelTemplate;
use crate::toolkit::{ControlHandle, RenderToolkit, ToolkitError};

/// Callback run when a control (or the device) activates a sifter.
pub type ActivationHandler = Box<dyn Fn(SifterId) + Send + Sync>;

/// One materialized control and the sifter it stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlBinding {
    pub sifter_id: SifterId,
    pub handle: ControlHandle,
    pub label: String,
}

/// Result of one projection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub controls: usize,
    /// No sifters configured. The next handshake still pushes an (empty) batch.
    pub empty: bool,
}

pub struct UiProjector<T: RenderToolkit> {
    toolkit: T,
    labels: LabelTemplate,
    bindings: Vec<ControlBinding>,
    on_activate: Option<ActivationHandler>,
}

impl<T: RenderToolkit> UiProjector<T> {
    pub fn new(toolkit: T, labels: LabelTemplate) -> Self {
        Self {
            toolkit,
            labels,
            bindings: Vec::new(),
            on_activate: None,
        }
    }

    /// Install the handler every control routes its activation to.
    pub fn set_activation_handler(&mut self, handler: ActivationHandler) {
        self.on_activate = Some(handler);
    }

    /// Materialize exactly one control per sifter, in the given order.
    ///
    /// Any controls from a previous pass are released first, so repeated calls
    /// on an unchanged registry produce an equivalent control set instead of
    /// accumulating duplicates. Labels are rendered before the toolkit is
    /// touched; a template failure leaves the current controls in place.
    pub fn project(&mut self, sifters: &[Sifter]) -> Result<Projection, ProjectError> {
        let labels = sifters
            .iter()
            .map(|sifter| self.labels.render(sifter))
            .collect::<Result<Vec<_>, _>>()?;

        self.release();

        let handles = self.toolkit.materialize(&labels)?;
        if handles.len() != labels.len() {
            let returned = handles.len();
            self.toolkit.release_all();
            return Err(ToolkitError::HandleCountMismatch {
                requested: labels.len(),
                returned,
            }
            .into());
        }

        self.bindings = sifters
            .iter()
            .zip(handles)
            .zip(labels)
            .map(|((sifter, handle), label)| ControlBinding {
                sifter_id: sifter.id,
                handle,
                label,
            })
            .collect();

        let projection = Projection {
            controls: self.bindings.len(),
            empty: self.bindings.is_empty(),
        };
        tracing::debug!(controls = projection.controls, "controls projected");
        Ok(projection)
    }

    /// Drop every control. Returns how many were released.
    pub fn release(&mut self) -> usize {
        let released = self.bindings.len();
        self.toolkit.release_all();
        self.bindings.clear();
        if released > 0 {
            tracing::debug!(released, "controls released");
        }
        released
    }

    /// Route a control activation to the handler.
    pub fn activate(&self, handle: ControlHandle) -> Result<SifterId, ProjectError> {
        let binding = self
            .bindings
            .iter()
            .find(|b| b.handle == handle)
            .ok_or(ProjectError::UnknownControl(handle))?;
        self.dispatch_activation(binding.sifter_id);
        Ok(binding.sifter_id)
    }

    /// Run the activation handler for `id` without going through a control,
    /// e.g. when the device selects a sifter while the host view is hidden.
    pub fn dispatch_activation(&self, id: SifterId) {
        match &self.on_activate {
            Some(handler) => handler(id),
            None => tracing::debug!(sifter_id = %id, "activation without handler ignored"),
        }
    }

    pub fn bindings(&self) -> &[ControlBinding] {
        &self.bindings
    }

    pub fn labels(&self) -> Vec<String> {
        self.bindings.iter().map(|b| b.label.clone()).collect()
    }

    pub fn toolkit(&self) -> &T {
        &self.toolkit
    }
}
