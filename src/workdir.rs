//! Scoped changes of the process working directory.
//!
//! The working directory is process-global. Every change goes through a
//! [`WorkDirGuard`], which restores the previous directory when dropped, so
//! nested scopes unwind last-changed, first-restored.
use std::io;
use std::path::{Path, PathBuf};

/// Restores the original working directory on drop.
#[derive(Debug)]
#[must_use = "the working directory is restored as soon as the guard is dropped"]
pub struct WorkDirGuard {
    origin: PathBuf,
    target: PathBuf,
}

impl WorkDirGuard {
    /// Record the current directory and change to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be read or `target`
    /// cannot be entered. The working directory is unchanged in that case.
    pub fn enter(target: &Path) -> io::Result<Self> {
        let origin = std::env::current_dir()?;
        std::env::set_current_dir(target)?;
        Ok(Self {
            origin,
            target: target.to_path_buf(),
        })
    }

    /// Directory that was current before the guard was created.
    #[must_use]
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Directory the guard changed into.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Drop for WorkDirGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.origin) {
            tracing::error!(
                "failed to restore working directory {}: {e}",
                self.origin.display()
            );
        }
    }
}

/// Run `body` with the working directory set to `target`.
///
/// The original directory is restored whether `body` returns normally or
/// unwinds.
///
/// # Errors
///
/// Returns an error if `target` cannot be entered; `body` is not run.
pub fn with_work_dir<T>(target: &Path, body: impl FnOnce() -> T) -> io::Result<T> {
    let _guard = WorkDirGuard::enter(target)?;
    Ok(body())
}

/// Serialises tests that touch the process working directory.
#[cfg(test)]
pub(crate) static CWD_TEST_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn lock() -> std::sync::MutexGuard<'static, ()> {
        CWD_TEST_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn canonical_cwd() -> PathBuf {
        dunce::canonicalize(std::env::current_dir().unwrap()).unwrap()
    }

    #[test]
    fn restores_after_successful_body() {
        let _lock = lock();
        let origin = canonical_cwd();
        let dir = tempfile::tempdir().unwrap();
        let target = dunce::canonicalize(dir.path()).unwrap();

        let inside = with_work_dir(&target, canonical_cwd).unwrap();

        assert_eq!(inside, target);
        assert_eq!(canonical_cwd(), origin);
    }

    #[test]
    fn restores_after_failing_body() {
        let _lock = lock();
        let origin = canonical_cwd();
        let dir = tempfile::tempdir().unwrap();

        let result: Result<(), String> =
            with_work_dir(dir.path(), || Err("boom".to_string())).unwrap();

        assert!(result.is_err());
        assert_eq!(canonical_cwd(), origin);
    }

    #[test]
    fn restores_after_panicking_body() {
        let _lock = lock();
        let origin = canonical_cwd();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();

        let unwound = std::panic::catch_unwind(move || {
            let _ = with_work_dir::<()>(&path, || panic!("boom"));
        });

        assert!(unwound.is_err());
        assert_eq!(canonical_cwd(), origin);
    }

    #[test]
    fn nested_scopes_unwind_in_order() {
        let _lock = lock();
        let origin = canonical_cwd();
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let a_path = dunce::canonicalize(a.path()).unwrap();

        {
            let outer = WorkDirGuard::enter(a.path()).unwrap();
            assert_eq!(dunce::canonicalize(outer.origin()).unwrap(), origin);
            {
                let _inner = WorkDirGuard::enter(b.path()).unwrap();
            }
            assert_eq!(canonical_cwd(), a_path);
        }
        assert_eq!(canonical_cwd(), origin);
    }

    #[test]
    fn missing_target_leaves_cwd_untouched() {
        let _lock = lock();
        let origin = canonical_cwd();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");

        let ran = with_work_dir(&missing, || true);

        assert!(ran.is_err());
        assert_eq!(canonical_cwd(), origin);
    }
}
