//! Protected files: paths the agent may never write or delete.
//!
//! The write/delete/move tools check every target against this list before
//! touching the filesystem. Paths resolve relative to the project
//! directory; a path outside the project is not protected.

use std::path::Path;

const PROTECTED_PATHS: &[&str] = &[
    "vault.salt",
    "vault.enc",
    "noctua.db",
    ".env",
];

const PROTECTED_PREFIXES: &[&str] = &["vault."];

/// Whether `path` points at a safety-critical file.
pub fn is_protected(path: &Path, project_dir: &Path) -> bool {
    let relative = match path.strip_prefix(project_dir) {
        Ok(rel) => rel,
        // Relative inputs are judged as project-relative.
        Err(_) if path.is_relative() => path,
        Err(_) => return false,
    };
    let Some(rel_str) = relative.to_str() else {
        return false;
    };

    PROTECTED_PATHS.contains(&rel_str)
        || PROTECTED_PREFIXES.iter().any(|p| rel_str.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn vault_files_are_protected() {
        let project = PathBuf::from("/proj");
        assert!(is_protected(&project.join("vault.salt"), &project));
        assert!(is_protected(&project.join("vault.enc"), &project));
        assert!(is_protected(Path::new("vault.enc"), &project));
    }

    #[test]
    fn database_and_env_are_protected() {
        let project = PathBuf::from("/proj");
        assert!(is_protected(&project.join("noctua.db"), &project));
        assert!(is_protected(&project.join(".env"), &project));
    }

    #[test]
    fn other_files_are_not() {
        let project = PathBuf::from("/proj");
        assert!(!is_protected(&project.join("notes.md"), &project));
        assert!(!is_protected(Path::new("/elsewhere/vault.enc"), &project));
    }
}
