//! The six-stage run: unpack, patch, repack, generate a key-store, sign, verify.
//!
//! Stages run strictly in order and the first failure ends the run. The
//! workspace is released on every exit path. A partially written output
//! package is left where it is.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{Config, SigningConfig};
use crate::error::{Error, Result, StageFailure};
use crate::environment::Toolchain;
use crate::manifest;
use crate::tool::{self, ToolOutput};
use crate::workspace::Workspace;

/// Build a `Vec<OsString>` from a mix of `&str`, `&String` and `&Path`.
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        vec![$(OsString::from($arg)),*]
    };
}

/// Number of `jarsigner -verify` lines shown to the user.
const VERIFY_LINES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Unpacking,
    PatchingManifest,
    Repacking,
    GeneratingCredentials,
    Signing,
    Verifying,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Unpacking,
        Stage::PatchingManifest,
        Stage::Repacking,
        Stage::GeneratingCredentials,
        Stage::Signing,
        Stage::Verifying,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Unpacking => "Unpacking",
            Stage::PatchingManifest => "PatchingManifest",
            Stage::Repacking => "Repacking",
            Stage::GeneratingCredentials => "GeneratingCredentials",
            Stage::Signing => "Signing",
            Stage::Verifying => "Verifying",
        }
    }

    pub fn banner(self) -> &'static str {
        match self {
            Stage::Unpacking => "=> Unpacking APK...",
            Stage::PatchingManifest => "=> Adding debug flag...",
            Stage::Repacking => "=> Repacking APK...",
            Stage::GeneratingCredentials => "=> Generating keystore...",
            Stage::Signing => "=> Signing APK...",
            Stage::Verifying => "=> Checking your debug APK...",
        }
    }

    fn next(self) -> Option<Stage> {
        let index = Stage::ALL.iter().position(|s| *s == self)?;
        Stage::ALL.get(index + 1).copied()
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running(Stage),
    Succeeded,
    Failed(Stage),
}

/// Cursor over the stages. Only moves forward, and stops at the first failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    phase: Phase,
    statuses: [StageStatus; 6],
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            phase: Phase::Running(Stage::Unpacking),
            statuses: [StageStatus::Pending; 6],
        }
    }
}

impl RunState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current(&self) -> Option<Stage> {
        match self.phase {
            Phase::Running(stage) => Some(stage),
            Phase::Succeeded | Phase::Failed(_) => None,
        }
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.statuses[stage.index()]
    }

    pub fn is_terminal(&self) -> bool {
        self.current().is_none()
    }

    /// Mark the running stage as succeeded and move to the next one.
    pub fn advance(&mut self) {
        let Phase::Running(stage) = self.phase else {
            return;
        };
        self.statuses[stage.index()] = StageStatus::Succeeded;
        self.phase = match stage.next() {
            Some(next) => Phase::Running(next),
            None => Phase::Succeeded,
        };
    }

    /// Mark the running stage as failed. No later stage will run.
    pub fn fail(&mut self) {
        let Phase::Running(stage) = self.phase else {
            return;
        };
        self.statuses[stage.index()] = StageStatus::Failed;
        self.phase = Phase::Failed(stage);
    }
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub output: PathBuf,
    pub verification: Vec<String>,
    pub state: RunState,
}

/// Inputs of one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input: PathBuf,
    /// Attach captured tool output to failures.
    pub capture: bool,
}

impl RunRequest {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            capture: false,
        }
    }

    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }
}

/// `app.apk` becomes `app.debug.apk`; a path without extension gets `.debug.apk`.
pub fn debug_output_path(input: &Path) -> PathBuf {
    let mut ext = OsString::from("debug.");
    ext.push(input.extension().unwrap_or(OsStr::new("apk")));
    input.with_extension(ext)
}

/// Check the environment, then run every stage in a fresh workspace.
pub async fn run(request: &RunRequest, config: &Config) -> Result<RunReport> {
    let toolchain = Toolchain::resolve(config).await?;

    if !request.input.exists() {
        tracing::info!(input = %request.input.display(), "input package not found");
        return Err(Error::NotFound(request.input.clone()));
    }

    let workspace = Workspace::create(config.workspace_root.as_deref()).map_err(Error::Workspace)?;
    let output = debug_output_path(&request.input);

    let report = Pipeline {
        toolchain: &toolchain,
        signing: &config.signing,
        workspace: &workspace,
        input: &request.input,
        output: &output,
        capture: request.capture,
    }
    .run()
    .await?;

    println!("\n======");
    println!("Success!");
    println!("======");
    println!("(deleting temporary directory...)");
    if let Err(e) = workspace.close() {
        tracing::warn!(error = %e, "could not remove temporary directory");
    }
    println!("Your debug APK: {}", report.output.display());

    Ok(report)
}

struct Pipeline<'a> {
    toolchain: &'a Toolchain,
    signing: &'a SigningConfig,
    workspace: &'a Workspace,
    input: &'a Path,
    output: &'a Path,
    capture: bool,
}

impl Pipeline<'_> {
    async fn run(&self) -> Result<RunReport> {
        let mut state = RunState::default();
        let mut verification = Vec::new();

        while let Some(stage) = state.current() {
            println!("{}", stage.banner());
            tracing::debug!(%stage, "stage started");

            match self.execute(stage).await {
                Ok(Some(output)) => verification = output.first_lines(VERIFY_LINES),
                Ok(None) => {}
                Err(source) => {
                    state.fail();
                    tracing::debug!(%stage, phase = ?state.phase(), "stage failed");
                    return Err(Error::Stage { stage, source });
                }
            }

            state.advance();
        }

        for line in &verification {
            println!("{line}");
        }

        tracing::info!(output = %self.output.display(), "debug package ready");
        Ok(RunReport {
            output: self.output.to_path_buf(),
            verification,
            state,
        })
    }

    /// Run one stage. Only verification hands its output back.
    async fn execute(&self, stage: Stage) -> Result<Option<ToolOutput>, StageFailure> {
        let apktool = &self.toolchain.apktool;
        let keytool = &self.toolchain.keytool;
        let jarsigner = &self.toolchain.jarsigner;
        let app_dir = self.workspace.app_dir();
        let keystore = self.workspace.keystore_path();
        let signing = self.signing;

        match stage {
            Stage::Unpacking => {
                let args = args!["-q", "d", self.input, "-o", &app_dir];
                tool::invoke(apktool, args, self.capture).await?;
            }
            Stage::PatchingManifest => {
                manifest::patch_debuggable(&self.workspace.manifest_path())?;
            }
            Stage::Repacking => {
                let args = args!["-q", "b", &app_dir, "--use-aapt2", "-o", self.output];
                tool::invoke(apktool, args, self.capture).await?;
            }
            Stage::GeneratingCredentials => {
                let args = args![
                    "-genkey",
                    "-noprompt",
                    "-alias",
                    &signing.alias,
                    "-dname",
                    &signing.dname,
                    "-keystore",
                    &keystore,
                    "-keyalg",
                    &signing.keyalg,
                    "-storepass",
                    &signing.passphrase,
                    "-keypass",
                    &signing.passphrase,
                ];
                tool::invoke(keytool, args, self.capture).await?;
            }
            Stage::Signing => {
                let args = args![
                    "-keystore",
                    &keystore,
                    "-storepass",
                    &signing.passphrase,
                    "-keypass",
                    &signing.passphrase,
                    self.output,
                    &signing.alias,
                ];
                tool::invoke(jarsigner, args, self.capture).await?;
            }
            Stage::Verifying => {
                let args = args!["-verify", self.output];
                return Ok(Some(tool::invoke(jarsigner, args, self.capture).await?));
            }
        }

        Ok(None)
    }
}
