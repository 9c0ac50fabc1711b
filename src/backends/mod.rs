// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer
//!
//! The bridge sits between two foreign systems, each behind a trait:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Host runtime (JVM)              │
//! └────────────────────▲────────────────────────┘
//!                      │ HostRuntime
//! ┌────────────────────┴────────────────────────┐
//! │                 bridge                       │
//! └────────────────────▲────────────────────────┘
//!                      │ DepthDataListener
//! ┌────────────────────┴────────────────────────┐
//! │        Depth-camera driver (SDK threads)     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`driver`]: driver SDK traits and the simulated driver
//! - [`host`]: host runtime trait, in-process and JNI runtimes

pub mod driver;
pub mod host;
