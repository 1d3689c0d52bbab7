pub mod client;
pub mod error;
pub mod snapshot;
pub mod state;
pub mod types;

pub use client::{ChatClient, ClientAction, ClientError, RecordingClient};
pub use error::{RenderError, RenderStage, TemplateError};
pub use snapshot::*;
pub use state::*;
pub use types::*;
