//! Resolution of ledger filenames inside the configured root directory

use std::{
    fs,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use crate::errors::Error;

const CSV_EXTENSION: &str = ".csv";

/// Locates ledger files beneath a single root directory.
///
/// Only immediate children of the root are reachable. Names are checked before
/// anything under the root is touched, and the canonical target is checked again
/// so a symlink cannot lead outside the root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Creates a resolver for `root`, which must be an existing directory.
    /// # Errors
    /// [`Error::NotConfigured`] if `root` does not exist or is not a directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref();
        let canonical = fs::canonicalize(root).map_err(|err| {
            Error::NotConfigured(format!("ledger directory {} is invalid: {err}", root.display()))
        })?;
        if !canonical.is_dir() {
            return Err(Error::NotConfigured(format!(
                "ledger directory {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root: canonical })
    }

    /// Returns the canonical root directory
    #[must_use]
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `filename` to an absolute path of an existing ledger file under the root.
    /// # Errors
    /// - [`Error::InvalidPath`] if the name is empty, is not a plain `.csv` filename, or
    ///   resolves outside the root
    /// - [`Error::NotFound`] if no such file exists
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, Error> {
        let name = validate_filename(filename)?;
        let target = match fs::canonicalize(self.root.join(name)) {
            Ok(target) => target,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(name.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        if target.parent() != Some(self.root.as_path()) {
            return Err(Error::InvalidPath(format!(
                "{name} resolves outside the ledger directory"
            )));
        }
        if !target.is_file() {
            return Err(Error::NotFound(name.to_string()));
        }
        Ok(target)
    }

    /// Lists the `.csv` files directly inside the root, sorted by name.
    ///
    /// The directory is read on every call.
    /// # Errors
    /// [`Error::Io`] if the directory cannot be read
    pub fn list(&self) -> Result<Vec<String>, Error> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if has_csv_extension(&name) && entry.path().is_file() {
                files.push(name);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn has_csv_extension(name: &str) -> bool {
    name.len() > CSV_EXTENSION.len() && name.to_lowercase().ends_with(CSV_EXTENSION)
}

/// Checks that `filename` is a single plain `.csv` file name, without touching the file system.
/// # Errors
/// [`Error::InvalidPath`] describing the first problem found
pub fn validate_filename(filename: &str) -> Result<&str, Error> {
    let name = filename.trim();
    if name.is_empty() {
        return Err(Error::InvalidPath(
            "no filename given; list the directory instead".to_string(),
        ));
    }
    if name.contains(['\\', '\0']) {
        return Err(Error::InvalidPath(format!("{name} contains a forbidden character")));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => {
            return Err(Error::InvalidPath(format!(
                "{name} must be a file name inside the ledger directory"
            )))
        }
    }
    if !has_csv_extension(name) {
        return Err(Error::InvalidPath(format!("{name} must end with .csv")));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, PathResolver) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ledgers");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("b.csv"), "x").unwrap();
        fs::write(root.join("A.CSV"), "x").unwrap();
        fs::write(root.join("notes.txt"), "x").unwrap();
        fs::create_dir(root.join("nested.csv")).unwrap();
        fs::write(dir.path().join("outside.csv"), "secret").unwrap();
        let resolver = PathResolver::new(&root).unwrap();
        (dir, resolver)
    }

    #[test]
    fn test_rejects_traversal_and_absolute_names() {
        let (dir, resolver) = fixture();
        let absolute = dir.path().join("outside.csv");
        let names = [
            "../outside.csv",
            "..",
            "./b.csv",
            "ledgers/../../outside.csv",
            "sub/b.csv",
            "..\\outside.csv",
            "/etc/passwd.csv",
            absolute.to_str().unwrap(),
        ];
        for name in names {
            assert!(
                matches!(validate_filename(name), Err(Error::InvalidPath(_))),
                "{name} should be rejected"
            );
            assert!(matches!(resolver.resolve(name), Err(Error::InvalidPath(_))));
        }
    }

    #[test]
    fn test_rejects_empty_and_non_csv() {
        for name in ["", "   ", "notes.txt", "b.csv.bak", ".csv"] {
            assert!(matches!(validate_filename(name), Err(Error::InvalidPath(_))));
        }
    }

    #[test]
    fn test_resolves_existing_file() {
        let (_dir, resolver) = fixture();
        let path = resolver.resolve("b.csv").unwrap();
        assert_eq!(path, resolver.root().join("b.csv"));
        assert!(resolver.resolve("A.CSV").is_ok());
    }

    #[test]
    fn test_missing_file_and_directory_are_not_found() {
        let (_dir, resolver) = fixture();
        assert!(matches!(resolver.resolve("missing.csv"), Err(Error::NotFound(_))));
        assert!(matches!(resolver.resolve("nested.csv"), Err(Error::NotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_symlink_escape() {
        let (dir, resolver) = fixture();
        std::os::unix::fs::symlink(dir.path().join("outside.csv"), resolver.root().join("link.csv"))
            .unwrap();
        assert!(matches!(resolver.resolve("link.csv"), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_list_is_sorted_and_csv_only() {
        let (_dir, resolver) = fixture();
        assert_eq!(resolver.list().unwrap(), vec!["A.CSV", "b.csv"]);
    }

    #[test]
    fn test_new_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PathResolver::new(dir.path().join("missing")),
            Err(Error::NotConfigured(_))
        ));
    }
}
