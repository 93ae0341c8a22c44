//! Config search path: the once-only global initialization step that must
//! run before anything is composed from a raw command line.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use super::compose::ComposeError;

/// Environment variable naming the configuration root.
pub const CONF_ROOT_ENV: &str = "CONF_ROOT";

/// Resolve the configuration root.
///
/// `explicit` wins over [`CONF_ROOT_ENV`]. Relative locations are taken
/// relative to `project_dir`.
pub fn resolve_root(explicit: Option<&Path>, project_dir: &Path) -> Result<PathBuf, ComposeError> {
    resolve_root_with(explicit, env::var_os(CONF_ROOT_ENV), project_dir)
}

/// [`resolve_root`] with the environment value supplied by the caller.
/// An empty value counts as unset.
pub fn resolve_root_with(
    explicit: Option<&Path>,
    env_value: Option<OsString>,
    project_dir: &Path,
) -> Result<PathBuf, ComposeError> {
    let root = match explicit {
        Some(path) => path.to_path_buf(),
        None => env_value
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| ComposeError::MissingConfigRoot(CONF_ROOT_ENV.to_string()))?,
    };

    if root.is_absolute() {
        Ok(root)
    } else {
        Ok(project_dir.join(root))
    }
}

/// Once-initialized location configurations are searched in.
#[derive(Debug, Default)]
pub struct SearchPath {
    root: Mutex<Option<PathBuf>>,
}

impl SearchPath {
    pub const fn new() -> Self {
        Self {
            root: Mutex::new(None),
        }
    }

    /// The search path shared by the whole process.
    pub fn shared() -> Arc<SearchPath> {
        static SHARED: OnceLock<Arc<SearchPath>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(SearchPath::new())))
    }

    /// Initialize the search path. A second call fails, whatever its root.
    pub fn initialize(&self, root: &Path) -> Result<(), ComposeError> {
        let mut current = self.lock();
        if let Some(existing) = current.as_ref() {
            return Err(ComposeError::AlreadyInitialized(existing.clone()));
        }
        tracing::debug!(root = %root.display(), "config search path initialized");
        *current = Some(root.to_path_buf());
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    pub fn root(&self) -> Option<PathBuf> {
        self.lock().clone()
    }

    /// Clear the search path so it can be initialized again.
    pub fn reset(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PathBuf>> {
        match self.root.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests reading or writing CONF_ROOT in the process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_initialize_once() {
        let search = SearchPath::new();
        assert!(!search.is_initialized());

        search.initialize(Path::new("/srv/conf")).unwrap();
        assert_eq!(search.root(), Some(PathBuf::from("/srv/conf")));

        let err = search.initialize(Path::new("/other")).unwrap_err();
        assert!(matches!(
            err,
            ComposeError::AlreadyInitialized(ref p) if p == Path::new("/srv/conf")
        ));
    }

    #[test]
    fn test_reset_allows_reinitialize() {
        let search = SearchPath::new();
        search.initialize(Path::new("/a")).unwrap();
        search.reset();
        search.initialize(Path::new("/b")).unwrap();
        assert_eq!(search.root(), Some(PathBuf::from("/b")));
    }

    #[test]
    fn test_resolve_explicit_relative() {
        let root = resolve_root(Some(Path::new("conf")), Path::new("/project")).unwrap();
        assert_eq!(root, PathBuf::from("/project/conf"));

        let root = resolve_root(Some(Path::new("/abs/conf")), Path::new("/project")).unwrap();
        assert_eq!(root, PathBuf::from("/abs/conf"));
    }

    #[test]
    fn test_resolve_env_relative_joined_to_project() {
        let root = resolve_root_with(None, Some("conf".into()), Path::new("/project")).unwrap();
        assert_eq!(root, PathBuf::from("/project/conf"));

        let root =
            resolve_root_with(None, Some("/srv/conf".into()), Path::new("/project")).unwrap();
        assert_eq!(root, PathBuf::from("/srv/conf"));
    }

    #[test]
    fn test_resolve_explicit_wins_over_env() {
        let root = resolve_root_with(
            Some(Path::new("/explicit")),
            Some("/from/env".into()),
            Path::new("/project"),
        )
        .unwrap();
        assert_eq!(root, PathBuf::from("/explicit"));
    }

    #[test]
    fn test_resolve_missing_or_empty_env() {
        for env_value in [None, Some(OsString::new())] {
            let err = resolve_root_with(None, env_value, Path::new("/project")).unwrap_err();
            assert!(matches!(
                err,
                ComposeError::MissingConfigRoot(ref var) if var == CONF_ROOT_ENV
            ));
        }
    }

    #[test]
    fn test_resolve_reads_process_environment() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let saved = env::var_os(CONF_ROOT_ENV);

        env::set_var(CONF_ROOT_ENV, "settings");
        let resolved = resolve_root(None, Path::new("/project"));
        env::remove_var(CONF_ROOT_ENV);
        let missing = resolve_root(None, Path::new("/project"));

        if let Some(value) = saved {
            env::set_var(CONF_ROOT_ENV, value);
        }
        assert_eq!(resolved.unwrap(), PathBuf::from("/project/settings"));
        assert!(matches!(missing, Err(ComposeError::MissingConfigRoot(_))));
    }
}
