//! Tool-backend plumbing for quill.
//!
//! Backends are external processes that own named tools, spoken to over
//! line-delimited JSON-RPC on stdio. A [`ToolSession`] connects every
//! configured backend, collects their tools into a [`ToolRouter`], and
//! guarantees teardown on every exit path.

pub mod backend;
pub mod config;
pub mod error;
pub mod protocol;
pub mod router;
pub mod session;
pub mod stdio;

pub use backend::ToolBackend;
pub use config::{ServerConfig, ServersConfig};
pub use error::{BackendError, Result};
pub use protocol::{BackendTool, CallResult, ContentItem};
pub use router::ToolRouter;
pub use session::ToolSession;
pub use stdio::StdioBackend;
