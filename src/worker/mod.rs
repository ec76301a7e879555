//! Persistent sandbox worker.
//!
//! `codeloop worker` runs a [`WorkerServer`] over its own stdin and stdout;
//! the host drives it through a [`WorkerClient`], which is a [`CodeExecutor`]
//! like the in-process runner. Logging stays on stderr so that stdout carries
//! only protocol lines.
//!
//! [`CodeExecutor`]: crate::sandbox::CodeExecutor

mod client;
pub mod protocol;
mod server;

pub use client::WorkerClient;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use server::WorkerServer;
