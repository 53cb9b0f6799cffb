//! projbox: toolchain discovery and path-confined execution of small
//! multi-language code projects.
//!
//! The engine discovers interpreters and compilers on the host, scaffolds and runs
//! Python, Node.js, Java, Delphi and static web projects, executes one-shot
//! snippets through scoped temporary files, and exposes a filesystem view that
//! never leaves the configured project roots. Every operation is reachable through
//! [`engine::Engine`], and the same surface is served as NDJSON by [`driver`].

#![deny(unsafe_code)]
// Public API types have docs; internal helpers are documented where non-obvious.
#![allow(missing_docs)]

pub mod driver;
pub mod engine;
pub mod error;
pub mod launch;
pub mod model;
pub mod platform;
pub mod policy;
pub mod project;
pub mod runner;
pub mod settings;
pub mod snippet;
pub mod toolchain;
pub mod workspace;

pub use crate::engine::{Engine, Session};
pub use crate::error::{EngineError, EngineResult, ErrorCode, ErrorInfo};
pub use crate::model::*;
