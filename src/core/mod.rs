pub mod chat_stream;
pub mod config;
pub mod decoder;
pub mod documents;
#[cfg(test)]
mod pipeline_tests;
pub mod prompt;
pub mod relay;
pub mod turn;
