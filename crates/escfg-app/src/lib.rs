//! escfg-app - Operation coordination and session state for the ESC configurator
//!
//! This crate implements the TEA (The Elm Architecture) pattern for the device
//! session: connection lifecycle, mutual exclusion between hardware
//! operations, per-device progress, the melody editor gate, and the Engine
//! that runs driver calls on background tasks.
//!
//! ## Public API
//!
//! - [`Engine`] - Owns state, channels and driver tasks; broadcasts [`EngineEvent`]s
//! - [`Request`] - Operator requests (`Engine::request`)
//! - [`AppState`] / [`SessionSnapshot`] - The model and its read-only view
//! - [`ConnectionState`], [`OperationRegistry`], [`ProgressTable`],
//!   [`MelodyEditorSession`] - The sub-states the coordinator owns
//! - [`config`] - `config.toml` loading and saving

pub mod actions;
pub mod config;
pub mod connection;
pub mod engine;
pub mod engine_event;
pub mod handler;
pub mod melody;
pub mod message;
pub mod process;
pub mod progress;
pub mod registry;
pub mod state;

// Re-export primary types
pub use config::Settings;
pub use connection::ConnectionState;
pub use engine::Engine;
pub use engine_event::EngineEvent;
pub use handler::{UpdateAction, UpdateResult};
pub use melody::{EditorVisibility, MelodyEditorSession};
pub use message::{Message, Request};
pub use progress::{BatchOutcome, DeviceFailure, ProgressEntry, ProgressTable};
pub use registry::{OperationGuard, OperationRegistry, RegistrySnapshot};
pub use state::{AppState, LinkPhase, OperationOutcome, Rejection, SessionSnapshot};
