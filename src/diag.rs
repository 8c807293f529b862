//! Path-tagged diagnostics
//!
//! Diagnostics are the user-facing failure channel: they travel inside the
//! response body rather than failing the RPC. A lifecycle method that wants
//! to surface one returns `Error::Diagnostics`; everything else it returns
//! is treated as a transport failure.

use std::fmt;

use crate::error::{Error, Result};
use crate::path::{Path, PathStep};

/// Severity of a diagnostic. The discriminants are the wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error = 1,
    Warning = 2,
}

/// A single user-visible message, optionally addressed to an attribute
/// path so the orchestrator can render source context.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub path: Option<Path>,
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            path: None,
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            path: None,
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    pub fn with_path(mut self, path: Path) -> Self {
        self.path = Some(path);
        self
    }
}

/// An ordered sequence of diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics(pub Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff any element is an error; warnings alone accompany success.
    pub fn is_error(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.0.push(diag);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(v: Vec<Diagnostic>) -> Self {
        Self(v)
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(d: Diagnostic) -> Self {
        Self(vec![d])
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("empty diagnostics");
        }
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            f.write_str(&d.summary)?;
        }
        Ok(())
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Build an error diagnostic addressed to `steps`.
///
/// A path with any missing step is demoted: the error is emitted without a
/// path plus a warning, so a malformed path from author code never crashes
/// the orchestrator's source rendering.
pub fn attribute_error(msg: impl Into<String>, steps: Vec<Option<PathStep>>) -> Diagnostics {
    let msg = msg.into();
    if steps.iter().any(|s| s.is_none()) {
        return Diagnostics(vec![
            Diagnostic::error(msg.clone(), msg),
            Diagnostic::warning("Missing attribute path step", "Missing attribute path step"),
        ]);
    }

    let path = Path {
        steps: steps.into_iter().flatten().collect(),
    };
    Diagnostics(vec![Diagnostic::error(msg.clone(), msg).with_path(path)])
}

/// Split the user-visible channel out of a lifecycle method result.
///
/// `Error::Diagnostics` becomes the returned diagnostics; any other error
/// propagates as a transport failure.
pub fn error_or_diagnostics(res: Result<()>) -> Result<Diagnostics> {
    match res {
        Ok(()) => Ok(Diagnostics::default()),
        Err(Error::Diagnostics(diags)) => Ok(diags),
        Err(err) => Err(err),
    }
}
