pub mod openai;

pub use openai::{Completer, CompletionError, CompletionRequest, OpenAiAdapter};
