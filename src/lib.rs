//! # jarscope
//!
//! An offline reader for compiled JVM class files found in directories and
//! ZIP/JAR archives, including nested and multi-release JARs.
//!
//! ## Architecture
//!
//! - **reader**: Big-endian byte cursor shared by every decoder
//! - **constant_pool**: Typed constant pool with symbolic resolution
//! - **attribute**: Class, member and code attributes with an `Unknown` fallback
//! - **instruction**: Lazy bytecode iteration with pool-independent equality
//! - **classfile**: Class descriptor decoding and inherited member lookup
//! - **registry**: Shared class-name index used by aggregating loads
//! - **source**: Directory, archive and single-stream entry sources
//! - **multi_release**: `META-INF/versions` entry selection
//! - **dispatch**: Strict, permissive and modified-only entry policies
//! - **event**: Nested session/group/file/class-file listener protocol
//! - **loader**: Traversal driver firing events for every entry
//! - **monitor**: Session diffing into add/remove notifications
//! - **config**: JSON and environment configuration

pub mod attribute;
pub mod classfile;
pub mod config;
pub mod constant_pool;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod instruction;
pub mod loader;
pub mod monitor;
pub mod multi_release;
pub mod reader;
pub mod registry;
pub mod source;

#[cfg(test)]
mod testing;

pub use classfile::ClassFile;
pub use config::{LoaderConfig, MonitorConfig, SessionMode, Tolerance};
pub use error::{DecodeError, DecodeResult};
pub use event::{LoadEvent, LoadListener};
pub use loader::{ClassfileLoader, LoadSummary};
pub use monitor::Monitor;
