//! # sifter-ui
//!
//! Projects the sifter registry onto a rendering toolkit: one control per
//! sifter, in registry order, each bound to an activation handler.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sifter_core::SifterRegistry;
//! use sifter_ui::{LabelTemplate, TextToolkit, UiProjector};
//!
//! fn show(registry: &SifterRegistry) {
//!     if let Ok(labels) = LabelTemplate::new("{{ name }}") {
//!         let mut projector = UiProjector::new(TextToolkit::default(), labels);
//!         if let Ok(projection) = projector.project(registry.all()) {
//!             println!("{} controls", projection.controls);
//!         }
//!     }
//! }
//! ```

pub mod error;
pub mod label;
pub mod projector;
pub mod toolkit;

pub use error::ProjectError;
pub use label::LabelTemplate;
pub use projector::{ActivationHandler, ControlBinding, Projection, UiProjector};
pub use toolkit::{ControlHandle, RenderToolkit, TextToolkit, ToolkitError};
