//! Shared plumbing for the noctua driver: configuration types and loader,
//! the jittered-exponential-backoff retry helper, and the task-local
//! warning sink used by best-effort cleanup paths.

pub mod config;
pub mod retry;
pub mod warnings;
