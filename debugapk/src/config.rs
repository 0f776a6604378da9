use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "debugapk.toml";

pub const REQUIRED_APKTOOL_VERSION: &str = "2.5.0";

/// A program name with optional leading arguments.
///
/// Accepts either `"keytool"` or `["sh", "/opt/keytool.sh"]` in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ToolCommand {
    Program(String),
    WithArgs(Vec<String>),
}

impl ToolCommand {
    pub fn program(&self) -> &str {
        match self {
            ToolCommand::Program(program) => program,
            ToolCommand::WithArgs(parts) => parts.first().map(String::as_str).unwrap_or_default(),
        }
    }

    pub fn prefix_args(&self) -> &[String] {
        match self {
            ToolCommand::Program(_) => &[],
            ToolCommand::WithArgs(parts) => parts.get(1..).unwrap_or_default(),
        }
    }
}

impl From<&str> for ToolCommand {
    fn from(program: &str) -> Self {
        ToolCommand::Program(program.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApktoolConfig {
    pub command: ToolCommand,
    pub required_version: String,
    /// Jar run through `java -jar` when the installed version doesn't match.
    pub fallback_jar: PathBuf,
}

impl Default for ApktoolConfig {
    fn default() -> Self {
        Self {
            command: "apktool".into(),
            required_version: REQUIRED_APKTOOL_VERSION.to_string(),
            fallback_jar: PathBuf::from(format!("apktool_{REQUIRED_APKTOOL_VERSION}.jar")),
        }
    }
}

/// Identity used to generate the throwaway key-store and sign the output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SigningConfig {
    pub alias: String,
    /// Used for both the store and the key.
    pub passphrase: String,
    pub dname: String,
    pub keyalg: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            alias: "alias1".to_string(),
            passphrase: "password".to_string(),
            dname: "CN=Unknown, OU=Unknown, O=Unknown, L=Unknown, S=Unknown, C=Unknown".to_string(),
            keyalg: "RSA".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub apktool: ApktoolConfig,
    pub java: ToolCommand,
    pub keytool: ToolCommand,
    pub jarsigner: ToolCommand,
    pub signing: SigningConfig,
    /// Parent directory for run workspaces; the system temp dir when unset.
    pub workspace_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apktool: ApktoolConfig::default(),
            java: "java".into(),
            keytool: "keytool".into(),
            jarsigner: "jarsigner".into(),
            signing: SigningConfig::default(),
            workspace_root: None,
        }
    }
}

impl Config {
    /// Load from `explicit`, else `./debugapk.toml` if present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.is_file() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::parse(&content).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
