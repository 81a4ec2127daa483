//! # Credential Hygiene
//!
//! `config.example.h` is the template that lives in version control; the
//! filled-in `config.h` carries the real Wi-Fi password and must stay out of it.
//! This module provides a [`Secret`] wrapper that never prints its contents and
//! a `.gitignore` check so the CLI can warn before writing credentials
//! somewhere git would pick them up.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

/// A credential that is redacted in `Debug` and `Display` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    /// The raw credential. Callers are responsible for not logging it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in characters, safe to report.
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(\"***\")")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<empty>")
        } else {
            f.write_str("********")
        }
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret::new(value)
    }
}

/// Report whether any `.gitignore` between `path` and the repository root
/// ignores it.
///
/// The walk stops at the first directory containing `.git`, or at the
/// filesystem root. Patterns follow git: inner `.gitignore` files override
/// outer ones, later rules (including `!negations`) win, and a file inside an
/// ignored directory stays ignored whatever its own rules say. `path` does not
/// need to exist yet.
pub fn is_gitignored(path: &Path) -> io::Result<bool> {
    let absolute = absolutize(path)?;
    let Some(start) = absolute.parent() else {
        return Ok(false);
    };

    let mut dirs = Vec::new();
    for dir in start.ancestors() {
        dirs.push(dir);
        if dir.join(".git").exists() {
            break;
        }
    }
    dirs.reverse();

    let mut matchers = Vec::new();
    for dir in &dirs {
        let candidate = dir.join(".gitignore");
        if candidate.is_file() {
            matchers.push(load_gitignore(dir, &candidate)?);
        }
    }

    // Excluded parent directories win over anything below them.
    for dir in dirs.iter().skip(1) {
        if is_ignored_by(&matchers, dir, true) {
            return Ok(true);
        }
    }
    Ok(is_ignored_by(&matchers, &absolute, false))
}

fn load_gitignore(dir: &Path, file: &Path) -> io::Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(dir);
    if let Some(err) = builder.add(file) {
        return Err(io::Error::new(io::ErrorKind::InvalidData, err));
    }
    builder
        .build()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

/// Apply the matchers outermost first; the last one with an opinion wins.
fn is_ignored_by(matchers: &[Gitignore], path: &Path, is_dir: bool) -> bool {
    let mut ignored = false;
    for gitignore in matchers {
        let root = gitignore.path();
        if path == root || !path.starts_with(root) {
            continue;
        }
        match gitignore.matched(path, is_dir) {
            Match::Ignore(_) => ignored = true,
            Match::Whitelist(_) => ignored = false,
            Match::None => {}
        }
    }
    ignored
}

fn absolutize(path: &Path) -> io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    // Lexical normalisation; the file may not exist yet so canonicalize is out.
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}
