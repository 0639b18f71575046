//! Question-answering facade and its request/response types.

mod service;
pub mod types;

pub use service::{QaApi, QaComponents, QaSettings, QaSystem};
pub use types::{QaOutput, QaResult, QueryInput};
