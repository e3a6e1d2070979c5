pub mod archive;
pub mod cleanup;
pub mod commands;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod package;
pub mod repository;
pub mod resolver;
pub mod runtime;
pub mod source;
pub mod transaction;

/// Fixtures shared by unit tests.
#[cfg(test)]
pub mod test_utils;
