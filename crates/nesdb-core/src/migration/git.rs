//! Journal backed by the commit history of the data repository.

use super::journal::MigrationJournal;
use crate::types::NesError;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Runs `git` inside the data root. The data root may be a subdirectory of
/// the work tree; only changes under it are committed.
#[derive(Debug, Clone)]
pub struct GitJournal {
    repo_path: PathBuf,
    identity: Option<(String, String)>,
}

impl GitJournal {
    pub fn new(repo_path: impl AsRef<Path>) -> Self {
        Self {
            repo_path: repo_path.as_ref().to_path_buf(),
            identity: None,
        }
    }

    /// Commit as `name <email>` instead of the configured user.
    #[must_use]
    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = Some((name.into(), email.into()));
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Whether the data root is inside a git work tree.
    pub fn is_repository(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .is_ok_and(|out| out.trim() == "true")
    }

    fn run(&self, args: &[&str]) -> Result<String, NesError> {
        let mut command = Command::new("git");
        if let Some((name, email)) = &self.identity {
            command
                .arg("-c")
                .arg(format!("user.name={}", name))
                .arg("-c")
                .arg(format!("user.email={}", email));
        }
        let output = command
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| NesError::JournalError(format!("cannot run git: {}", e)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(NesError::JournalError(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

/// Paths from `git status --porcelain -z`. Rename and copy entries carry the
/// original path as a second field, which is skipped.
fn parse_porcelain(output: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut fields = output.split('\0').filter(|f| !f.is_empty());
    while let Some(entry) = fields.next() {
        let Some((status, path)) = entry.split_at_checked(3) else {
            continue;
        };
        paths.push(path.to_string());
        if status.starts_with(['R', 'C']) {
            fields.next();
        }
    }
    paths
}

impl MigrationJournal for GitJournal {
    fn changed_paths(&self) -> Result<Vec<String>, NesError> {
        let output = self.run(&["status", "--porcelain", "-z", "-uall", "--", "."])?;
        Ok(parse_porcelain(&output))
    }

    fn append_entry(&mut self, message: &str, paths: &[String]) -> Result<String, NesError> {
        // Porcelain paths are relative to the work tree top.
        for chunk in paths.chunks(200) {
            let specs: Vec<String> = chunk.iter().map(|p| format!(":(top,literal){}", p)).collect();
            let mut args = vec!["add", "--"];
            args.extend(specs.iter().map(String::as_str));
            self.run(&args)?;
        }
        self.run(&["commit", "--allow-empty", "-m", message])?;
        let id = self.run(&["rev-parse", "HEAD"])?.trim().to_string();
        tracing::info!("Committed {} ({} paths)", id, paths.len());
        Ok(id)
    }

    fn list_entries(&self, prefix: &str) -> Result<Vec<String>, NesError> {
        let output = match self.run(&["log", "--format=%s"]) {
            Ok(output) => output,
            Err(NesError::JournalError(msg)) if msg.contains("does not have any commits") => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        Ok(output
            .lines()
            .filter(|subject| subject.starts_with(prefix))
            .map(str::to_string)
            .collect())
    }

    fn publish(&mut self) -> Result<(), NesError> {
        if self.run(&["remote"])?.trim().is_empty() {
            tracing::debug!("No git remote configured, skipping push");
            return Ok(());
        }
        match self.run(&["push"]) {
            Ok(_) => {
                tracing::info!("Pushed migration commits");
                Ok(())
            }
            Err(NesError::JournalError(msg))
                if msg.contains("No configured push destination")
                    || msg.contains("has no upstream branch") =>
            {
                tracing::warn!("Migration commits not pushed: {}", msg);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
