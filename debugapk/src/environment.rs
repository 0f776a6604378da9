//! Environment checks that gate a run.
//!
//! Everything here happens before a workspace exists. The only process
//! launched is apktool's version query.

use std::ffi::OsStr;

use thiserror::Error;

use crate::config::{Config, ToolCommand};
use crate::tool::{self, ToolDescriptor, ToolError};

#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("Failed to check installed {tool} version: {source}")]
    VersionQuery {
        tool: String,
        #[source]
        source: ToolError,
    },

    #[error("Could not parse a version from `{tool} --version` output")]
    UnparseableVersion { tool: String },

    #[error("I require apktool version {required} but found version {found}. Aborting.")]
    VersionMismatch { required: String, found: String },

    #[error("I require {tool} but it's not installed. Aborting.")]
    MissingTool {
        tool: String,
        #[source]
        source: which::Error,
    },
}

/// Resolved descriptors for every external tool the pipeline drives.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub apktool: ToolDescriptor,
    pub keytool: ToolDescriptor,
    pub jarsigner: ToolDescriptor,
}

impl Toolchain {
    pub async fn resolve(config: &Config) -> Result<Self, EnvironmentError> {
        let apktool = resolve_apktool(config).await?;
        let keytool = require_on_path("keytool", &config.keytool)?;
        let jarsigner = require_on_path("jarsigner", &config.jarsigner)?;

        tracing::info!(
            apktool = %apktool,
            keytool = %keytool,
            jarsigner = %jarsigner,
            "resolved toolchain"
        );

        Ok(Self {
            apktool,
            keytool,
            jarsigner,
        })
    }
}

/// Ask `tool` for its version: first token of the first line of `--version`.
pub async fn installed_version(tool: &ToolDescriptor) -> Result<String, EnvironmentError> {
    let output = tool::invoke(tool, ["--version"], false)
        .await
        .map_err(|source| EnvironmentError::VersionQuery {
            tool: tool.name.clone(),
            source,
        })?;

    parse_version(&output.stdout).ok_or_else(|| EnvironmentError::UnparseableVersion {
        tool: tool.name.clone(),
    })
}

fn parse_version(output: &str) -> Option<String> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .next()
        .map(str::to_owned)
}

async fn resolve_apktool(config: &Config) -> Result<ToolDescriptor, EnvironmentError> {
    let apktool = ToolDescriptor::from_command("apktool", &config.apktool.command);
    let required = &config.apktool.required_version;
    let found = installed_version(&apktool).await?;

    if &found == required {
        return Ok(apktool);
    }

    let jar = &config.apktool.fallback_jar;
    if !jar.is_file() {
        return Err(EnvironmentError::VersionMismatch {
            required: required.clone(),
            found,
        });
    }

    println!(
        "Found {} file in the current directory. Proceeding...",
        jar.display()
    );
    tracing::info!(
        required = %required,
        found = %found,
        jar = %jar.display(),
        "apktool version mismatch, running fallback jar"
    );

    Ok(ToolDescriptor::from_command("apktool", &config.java)
        .with_prefix([OsStr::new("-jar"), jar.as_os_str()]))
}

fn require_on_path(name: &str, command: &ToolCommand) -> Result<ToolDescriptor, EnvironmentError> {
    let resolved = which::which(command.program()).map_err(|source| EnvironmentError::MissingTool {
        tool: name.to_string(),
        source,
    })?;

    Ok(ToolDescriptor {
        name: name.to_string(),
        program: resolved.into_os_string(),
        prefix_args: command.prefix_args().iter().map(Into::into).collect(),
    })
}
