use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::Command;

use crate::config::ToolCommand;

/// An external program plus any arguments that must precede the caller's.
///
/// When apktool has to run from a jar, the descriptor is `java` with prefix
/// arguments `-jar apktool_2.5.0.jar`; every stage then invokes it the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub program: OsString,
    pub prefix_args: Vec<OsString>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, program: impl Into<OsString>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    pub fn from_command(name: impl Into<String>, command: &ToolCommand) -> Self {
        Self {
            name: name.into(),
            program: command.program().into(),
            prefix_args: command.prefix_args().iter().map(OsString::from).collect(),
        }
    }

    /// Append arguments that go before every invocation's own arguments.
    pub fn with_prefix<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.prefix_args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.prefix_args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Output and error text of a failed invocation, kept for debug display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} exited with {status}")]
    Failed {
        tool: String,
        status: ExitStatus,
        captured: Option<CapturedOutput>,
    },
}

impl ToolError {
    pub fn captured(&self) -> Option<&CapturedOutput> {
        match self {
            ToolError::Failed { captured, .. } => captured.as_ref(),
            ToolError::Launch { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn first_lines(&self, n: usize) -> Vec<String> {
        self.stdout.lines().take(n).map(str::to_owned).collect()
    }
}

/// Flags whose following argument is a secret.
const SECRET_FLAGS: &[&str] = &["-storepass", "-keypass", "--ks-pass", "--key-pass"];

/// Arguments as they may be logged, with passphrase values masked.
fn redacted(args: &[OsString]) -> Vec<String> {
    let mut masked = Vec::with_capacity(args.len());
    let mut secret_next = false;
    for arg in args {
        let arg = arg.to_string_lossy();
        masked.push(if secret_next {
            "******".to_string()
        } else {
            arg.to_string()
        });
        secret_next = SECRET_FLAGS.contains(&&*arg);
    }
    masked
}

/// Run `tool` to completion with both output streams captured in memory.
///
/// Nothing is echoed on success. On a nonzero exit the captured text is only
/// attached to the error when `capture` is set.
pub async fn invoke<I, S>(tool: &ToolDescriptor, args: I, capture: bool) -> Result<ToolOutput, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();

    tracing::debug!(
        tool = %tool.name,
        command = %tool,
        args = ?redacted(&args),
        "invoking external tool"
    );

    let output = Command::new(&tool.program)
        .args(&tool.prefix_args)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| ToolError::Launch {
            tool: tool.name.clone(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        tracing::debug!(tool = %tool.name, status = %output.status, "external tool failed");
        return Err(ToolError::Failed {
            tool: tool.name.clone(),
            status: output.status,
            captured: capture.then(|| CapturedOutput { stdout, stderr }),
        });
    }

    Ok(ToolOutput { stdout, stderr })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolDescriptor {
        ToolDescriptor::new("sh", "sh").with_prefix(["-c", script])
    }

    #[tokio::test]
    async fn success_returns_output_without_echo() {
        let out = invoke(&sh("printf 'one\\ntwo\\nthree\\n'"), Vec::<&str>::new(), false)
            .await
            .unwrap();

        assert_eq!(out.first_lines(2), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn caller_args_follow_prefix_args() {
        // With `sh -c`, the first trailing argument becomes $0.
        let out = invoke(&sh("printf '%s %s' \"$0\" \"$1\""), ["first", "second"], false)
            .await
            .unwrap();

        assert_eq!(out.stdout, "first second");
    }

    #[tokio::test]
    async fn failure_carries_capture_only_when_requested() {
        let tool = sh("echo partial; echo broken >&2; exit 3");

        let err = invoke(&tool, Vec::<&str>::new(), false).await.unwrap_err();
        assert!(matches!(err, ToolError::Failed { ref status, .. } if status.code() == Some(3)));
        assert!(err.captured().is_none());

        let err = invoke(&tool, Vec::<&str>::new(), true).await.unwrap_err();
        let captured = err.captured().unwrap();
        assert_eq!(captured.stdout, "partial\n");
        assert_eq!(captured.stderr, "broken\n");
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_error() {
        let tool = ToolDescriptor::new("ghost", "/nonexistent/debugapk-ghost-tool");
        let err = invoke(&tool, ["--version"], true).await.unwrap_err();

        assert!(matches!(err, ToolError::Launch { .. }));
        assert!(err.to_string().starts_with("failed to launch ghost"));
    }

    #[test]
    fn logged_args_hide_passphrases() {
        let args: Vec<OsString> = [
            "-keystore", "/tmp/ks", "-storepass", "hunter2", "-keypass", "hunter2", "app.apk", "alias1",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        let logged = redacted(&args);
        assert_eq!(
            logged,
            ["-keystore", "/tmp/ks", "-storepass", "******", "-keypass", "******", "app.apk", "alias1"]
        );
        assert!(!logged.iter().any(|a| a.contains("hunter2")));
    }

    #[test]
    fn display_includes_prefix() {
        let tool = ToolDescriptor::new("apktool", "java").with_prefix(["-jar", "apktool_2.5.0.jar"]);
        assert_eq!(tool.to_string(), "java -jar apktool_2.5.0.jar");
    }
}
