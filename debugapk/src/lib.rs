//! Turn a release APK into a debuggable, re-signed APK.
//!
//! The run is driven by [`pipeline::run`]: the environment is checked, a
//! scratch [`workspace::Workspace`] is created, and the package is unpacked,
//! patched, repacked, signed and verified with apktool, keytool and jarsigner.

pub mod config;
pub mod environment;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod tool;
pub mod workspace;

pub use config::Config;
pub use error::{Error, Result, StageFailure};
pub use pipeline::{RunReport, RunRequest, Stage, debug_output_path, run};
