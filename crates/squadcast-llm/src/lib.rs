// Prompt rendering and the streaming completion client.

pub mod client;
pub mod prompt;
