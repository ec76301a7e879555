//! Temporary script files written into the sandbox workspace.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A uniquely named script file that is removed when dropped.
///
/// Names carry a fresh UUID and the file is created with create-new
/// semantics, so concurrent runs sharing one workspace never touch each
/// other's scripts.
#[derive(Debug)]
pub struct ScriptArtifact {
    name: String,
    path: PathBuf,
    removed: bool,
}

impl ScriptArtifact {
    /// Writes `code` verbatim into a new script file inside `dir`.
    pub fn create(dir: &Path, code: &str) -> io::Result<Self> {
        let name = format!("agent_script_{}.py", uuid::Uuid::new_v4().simple());
        let path = dir.join(&name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;

        // from here on the guard owns the file, so a failed write still cleans up
        let artifact = Self {
            name,
            path,
            removed: false,
        };
        file.write_all(code.as_bytes())?;
        file.flush()?;

        Ok(artifact)
    }

    /// Path of the script file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the script, relative to the directory it was created in.
    pub fn file_name(&self) -> &str {
        &self.name
    }

    /// Removes the script file. Safe to call more than once.
    ///
    /// Failures are logged, never returned.
    pub fn cleanup(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;

        match remove_if_present(&self.path) {
            Ok(()) => tracing::debug!(script = %self.path.display(), "removed script artifact"),
            Err(e) => tracing::warn!(
                script = %self.path.display(),
                error = %e,
                "failed to remove script artifact"
            ),
        }
    }
}

impl Drop for ScriptArtifact {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Removes a file, treating "already gone" as success.
pub fn remove_if_present(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
