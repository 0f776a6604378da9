use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static DEBUGGABLE_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s+android:debuggable\s*=\s*(?:"[^"]*"|'[^']*')"#).expect("valid regex")
});

// Tag name must end at whitespace, `>` or `/>`, so `<application-foo` is skipped.
static APPLICATION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<application(\s|/?>)").expect("valid regex"));

// Comments and CDATA sections are copied through untouched.
static OPAQUE_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<!\[CDATA\[.*?\]\]>").expect("valid regex")
});

const DEBUGGABLE_TRUE: &str = r#" android:debuggable="true""#;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No <application> element in {}", path.display())]
    MissingApplication { path: PathBuf },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Mark the manifest at `path` debuggable, replacing the file in one step.
pub fn patch_debuggable(path: &Path) -> Result<(), ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let patched = patch_debuggable_text(&content).ok_or_else(|| ManifestError::MissingApplication {
        path: path.to_path_buf(),
    })?;

    write_replacing(path, patched.as_bytes()).map_err(|source| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::debug!(path = %path.display(), "manifest marked debuggable");
    Ok(())
}

/// Drop any `android:debuggable` attribute, then add `android:debuggable="true"`
/// right after the `<application` tag name.
///
/// Comments and CDATA sections are left as they are and never patched.
/// Returns `None` when the text has no `<application` element outside them.
pub fn patch_debuggable_text(content: &str) -> Option<String> {
    let mut stripped = String::with_capacity(content.len());
    let mut opaque = Vec::new();
    let mut last = 0;

    for span in OPAQUE_SPAN.find_iter(content) {
        stripped.push_str(&DEBUGGABLE_ATTR.replace_all(&content[last..span.start()], ""));
        let start = stripped.len();
        stripped.push_str(span.as_str());
        opaque.push(start..stripped.len());
        last = span.end();
    }
    stripped.push_str(&DEBUGGABLE_ATTR.replace_all(&content[last..], ""));

    let tag = APPLICATION_TAG
        .find_iter(&stripped)
        .find(|tag| !opaque.iter().any(|span| span.contains(&tag.start())))?;
    let insert_at = tag.start() + "<application".len();

    let mut patched = String::with_capacity(stripped.len() + DEBUGGABLE_TRUE.len());
    patched.push_str(&stripped[..insert_at]);
    patched.push_str(DEBUGGABLE_TRUE);
    patched.push_str(&stripped[insert_at..]);
    Some(patched)
}

fn write_replacing(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
