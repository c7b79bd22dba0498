pub mod codec;
pub mod generation;
pub mod prompt;

// Re-export commonly used services
pub use generation::{GeminiClient, GenerationClient};
pub use prompt::{AttemptInstruction, InstructionPayload};
