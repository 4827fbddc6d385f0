//! Event ingest: locating and reading transcript files
//!
//! ```text
//! ┌──────────────────────┐     ┌───────────────────┐     ┌────────────────────┐
//! │ ~/.claude/projects/  │ ──► │ TranscriptLocator │ ──► │ parse_transcript   │
//! │   <encoded-cwd>/     │     │ (SessionSelector) │     │ → SessionTranscript│
//! │     *.jsonl          │     └───────────────────┘     └────────────────────┘
//! └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tokenledger_core::ingest::{load_sessions, SessionSelector, TranscriptLocator};
//!
//! let locator = TranscriptLocator::new(config.claude_root());
//! let paths = locator.resolve(&project, &SessionSelector::Recent(3))?;
//! let sessions = load_sessions(&paths)?;
//! ```

mod parser;
mod summary;

pub use parser::{parse_lines, parse_transcript, session_id_from_path, SessionTranscript};

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Which sessions of a project to analyze.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionSelector {
    /// The most recently modified transcript
    #[default]
    Latest,
    /// The N most recently modified transcripts, newest first
    Recent(usize),
    /// A specific session id (exact, then unique prefix match)
    Id(String),
    /// Explicit transcript paths; missing ones become empty sessions
    Files(Vec<PathBuf>),
}

/// A transcript file discovered on disk.
#[derive(Debug, Clone)]
pub struct TranscriptFile {
    pub session_id: String,
    pub path: PathBuf,
    pub modified_at: SystemTime,
}

/// Read-only view over the agent's transcript directory.
#[derive(Debug, Clone)]
pub struct TranscriptLocator {
    root: PathBuf,
}

impl TranscriptLocator {
    /// Create a locator rooted at the agent data directory (e.g. `~/.claude`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the transcripts of a project.
    pub fn project_dir(&self, project: &Path) -> PathBuf {
        self.root
            .join("projects")
            .join(encode_project_path(&project.to_string_lossy()))
    }

    /// All transcripts of a project, newest first.
    pub fn list_sessions(&self, project: &Path) -> Result<Vec<TranscriptFile>> {
        let dir = self.project_dir(project);
        if !dir.is_dir() {
            return Ok(vec![]);
        }

        let pattern = dir.join("*.jsonl");
        let entries = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| Error::Config(format!("invalid transcript pattern: {}", e)))?;

        let mut files: Vec<TranscriptFile> = entries
            .flatten()
            .map(|path| {
                let modified_at = std::fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                TranscriptFile {
                    session_id: session_id_from_path(&path),
                    path,
                    modified_at,
                }
            })
            .collect();

        files.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| a.path.cmp(&b.path))
        });

        Ok(files)
    }

    /// Resolve a selector to transcript paths.
    ///
    /// An empty project directory is fatal for every selector except
    /// [`SessionSelector::Files`].
    pub fn resolve(&self, project: &Path, selector: &SessionSelector) -> Result<Vec<PathBuf>> {
        if let SessionSelector::Files(paths) = selector {
            return Ok(paths.clone());
        }

        let sessions = self.list_sessions(project)?;
        if sessions.is_empty() {
            return Err(Error::NoTranscripts(self.project_dir(project)));
        }

        let paths = match selector {
            SessionSelector::Latest => vec![sessions[0].path.clone()],
            SessionSelector::Recent(n) => sessions
                .iter()
                .take((*n).max(1))
                .map(|s| s.path.clone())
                .collect(),
            SessionSelector::Id(id) => {
                if let Some(exact) = sessions.iter().find(|s| &s.session_id == id) {
                    vec![exact.path.clone()]
                } else {
                    let matches: Vec<_> = sessions
                        .iter()
                        .filter(|s| s.session_id.starts_with(id.as_str()))
                        .collect();
                    match matches.as_slice() {
                        [only] => vec![only.path.clone()],
                        _ => return Err(Error::SessionNotFound(id.clone())),
                    }
                }
            }
            SessionSelector::Files(paths) => paths.clone(),
        };

        Ok(paths)
    }
}

/// Encode a project path the way the agent names its project directories:
/// every non-alphanumeric character becomes `-`, runs of `-` collapse.
pub fn encode_project_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for ch in path.chars() {
        let ch = if ch.is_ascii_alphanumeric() { ch } else { '-' };
        if ch == '-' && encoded.ends_with('-') {
            continue;
        }
        encoded.push(ch);
    }
    encoded
}

/// Read every transcript in `paths`.
///
/// Missing files become empty sessions carrying a not-found warning. If no
/// file exists at all the run is fatal.
pub fn load_sessions(paths: &[PathBuf]) -> Result<Vec<SessionTranscript>> {
    let mut sessions = Vec::with_capacity(paths.len());
    for path in paths {
        sessions.push(parse_transcript(path)?);
    }

    if !sessions.iter().any(|s| s.found) {
        let where_ = paths
            .first()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        return Err(Error::NoTranscripts(where_));
    }

    Ok(sessions)
}
