pub mod openai;
pub mod protocol;
pub mod provider;
pub mod sse;

pub use openai::OpenAiProvider;
pub use protocol::{decode_chunk, decode_sse_data, StreamEvent};
pub use provider::{EventStream, ModelError, ModelProvider};
