//! Per-scan inspector configuration rendering.
//!
//! The inspector reads a JavaScript config module naming the target GCP
//! project; credentials stay out of the file and flow through environment
//! variables. The rendered file lives under a per-scan name so concurrent
//! scans cannot collide, and is removed when the handle drops.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::ScanError;

/// Handle to a rendered config file. Removes the file on drop.
#[derive(Debug)]
pub struct RenderedConfig {
    path: PathBuf,
}

impl RenderedConfig {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RenderedConfig {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// The rendered path is a pure function of `(project_id, nonce)`.
pub fn config_path(dir: &Path, project_id: &str, nonce: &str) -> PathBuf {
    dir.join(format!("{project_id}_{nonce}_config.js"))
}

/// Render the inspector config for one scan.
///
/// Rejects project ids containing path separators before touching the
/// filesystem. The write is atomic: content lands in a scratch file in the
/// same directory and is renamed into place.
pub fn render(dir: &Path, project_id: &str, nonce: &str) -> Result<RenderedConfig, ScanError> {
    validate_project_id(project_id)?;

    let path = config_path(dir, project_id, nonce);
    let mut scratch = tempfile::NamedTempFile::new_in(dir)?;
    scratch.write_all(render_content(project_id).as_bytes())?;
    scratch
        .persist(&path)
        .map_err(|e| ScanError::Io(e.error))?;
    Ok(RenderedConfig { path })
}

fn render_content(project_id: &str) -> String {
    format!(
        "module.exports = {{ credentials: {{ google: {{ project: '{project_id}', \
         client_email: process.env.GOOGLE_SERVICE_ACCOUNT_EMAIL || '', \
         private_key: process.env.GOOGLE_SERVICE_ACCOUNT_PRIVATE_KEY || '' }}, \
         aws: {{}}, azure: {{}}, oracle: {{}}, github: {{}} }} }};\n"
    )
}

fn validate_project_id(project_id: &str) -> Result<(), ScanError> {
    if project_id.is_empty()
        || project_id.contains('/')
        || project_id.contains('\\')
        || project_id.contains("..")
    {
        return Err(ScanError::Config(format!(
            "invalid GCP project id: {project_id}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_pure_function_of_project_and_nonce() {
        let dir = Path::new("/tmp");
        let p1 = config_path(dir, "my-project", "abc123");
        let p2 = config_path(dir, "my-project", "abc123");
        assert_eq!(p1, p2);
        assert_eq!(p1, PathBuf::from("/tmp/my-project_abc123_config.js"));
    }

    #[test]
    fn renders_project_and_env_credential_references() {
        let dir = tempfile::tempdir().unwrap();
        let rendered = render(dir.path(), "my-project", "nonce1").unwrap();
        let content = std::fs::read_to_string(rendered.path()).unwrap();
        assert!(content.contains("project: 'my-project'"));
        assert!(content.contains("process.env.GOOGLE_SERVICE_ACCOUNT_EMAIL"));
        assert!(content.contains("process.env.GOOGLE_SERVICE_ACCOUNT_PRIVATE_KEY"));
        // Credentials are never written into the file itself.
        assert!(!content.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn rejects_project_id_with_path_separators() {
        let dir = tempfile::tempdir().unwrap();
        let err = render(dir.path(), "aaa/../../../", "nonce1").unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
        // No file is created for the rejected id.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn rejects_backslash_and_empty_project_ids() {
        let dir = tempfile::tempdir().unwrap();
        assert!(render(dir.path(), "a\\b", "n").is_err());
        assert!(render(dir.path(), "", "n").is_err());
    }

    #[test]
    fn file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let rendered = render(dir.path(), "my-project", "nonce2").unwrap();
            rendered.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
