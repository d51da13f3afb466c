//! Removal of transient files under lock contention.
//!
//! A file that was just copied or read may still be held open by another
//! process (an antivirus scanner, a lingering reader, a slow flush), which
//! makes deletion fail transiently on some platforms. [`safe_remove`]
//! retries such failures a bounded number of times and never returns an
//! error: the outcome is a boolean plus [`PipelineEvent`]s.

use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::events::{EventSink, PipelineEvent};

/// Retry policy for [`safe_remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimPolicy {
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ReclaimPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl From<&PipelineConfig> for ReclaimPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            attempts: config.reclaim_attempts,
            retry_delay: config.reclaim_retry_delay,
        }
    }
}

/// Remove a file, tolerating transient lock contention.
///
/// Returns `true` if the file is gone afterwards, including when it never
/// existed.
pub fn safe_remove(path: &Path, policy: &ReclaimPolicy, sink: &dyn EventSink) -> bool {
    safe_remove_with(path, policy, sink, |p| std::fs::remove_file(p))
}

/// Remove a directory tree with the same retry behavior as [`safe_remove`].
pub fn safe_remove_dir(path: &Path, policy: &ReclaimPolicy, sink: &dyn EventSink) -> bool {
    safe_remove_with(path, policy, sink, |p| std::fs::remove_dir_all(p))
}

/// Retry loop behind [`safe_remove`] and [`safe_remove_dir`].
pub(crate) fn safe_remove_with<F>(
    path: &Path,
    policy: &ReclaimPolicy,
    sink: &dyn EventSink,
    mut remove: F,
) -> bool
where
    F: FnMut(&Path) -> io::Result<()>,
{
    if !path.exists() {
        return true;
    }

    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match remove(path) {
            Ok(()) => {
                sink.emit(&PipelineEvent::Reclaimed {
                    path: path.to_path_buf(),
                });
                return true;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                sink.emit(&PipelineEvent::Reclaimed {
                    path: path.to_path_buf(),
                });
                return true;
            }
            Err(e) if is_contention(&e) && attempt < attempts => {
                sink.emit(&PipelineEvent::ReclaimRetry {
                    path: path.to_path_buf(),
                    attempt,
                    message: e.to_string(),
                });
                thread::sleep(policy.retry_delay);
            }
            Err(e) => {
                sink.emit(&PipelineEvent::ReclaimFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
                return false;
            }
        }
    }

    false
}

fn is_contention(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::ResourceBusy
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventSink;
    use std::fs;
    use tempfile::TempDir;

    fn fast_policy() -> ReclaimPolicy {
        ReclaimPolicy {
            attempts: 3,
            retry_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_missing_path_is_noop() {
        let dir = TempDir::new().unwrap();
        let sink = RecordingEventSink::new();

        assert!(safe_remove(&dir.path().join("ghost.csv"), &fast_policy(), &sink));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_removes_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload.csv");
        fs::write(&path, "a,b\n1,2\n").unwrap();
        let sink = RecordingEventSink::new();

        assert!(safe_remove(&path, &fast_policy(), &sink));
        assert!(!path.exists());
        assert_eq!(sink.kinds(), vec!["reclaimed"]);
    }

    #[test]
    fn test_retries_on_contention_then_succeeds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("locked.csv");
        fs::write(&path, "x").unwrap();
        let sink = RecordingEventSink::new();

        let mut calls = 0;
        let removed = safe_remove_with(&path, &fast_policy(), &sink, |p| {
            calls += 1;
            if calls < 3 {
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            } else {
                fs::remove_file(p)
            }
        });

        assert!(removed);
        assert_eq!(calls, 3);
        assert_eq!(sink.kinds(), vec!["reclaim_retry", "reclaim_retry", "reclaimed"]);
    }

    #[test]
    fn test_gives_up_after_attempts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stuck.csv");
        fs::write(&path, "x").unwrap();
        let sink = RecordingEventSink::new();

        let mut calls = 0;
        let removed = safe_remove_with(&path, &fast_policy(), &sink, |_| {
            calls += 1;
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        });

        assert!(!removed);
        assert_eq!(calls, 3);
        assert!(path.exists());
        assert_eq!(sink.kinds().last(), Some(&"reclaim_failed"));
    }

    #[test]
    fn test_other_errors_abort_immediately() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("odd.csv");
        fs::write(&path, "x").unwrap();
        let sink = RecordingEventSink::new();

        let mut calls = 0;
        let removed = safe_remove_with(&path, &fast_policy(), &sink, |_| {
            calls += 1;
            Err(io::Error::other("device gone"))
        });

        assert!(!removed);
        assert_eq!(calls, 1);
        assert_eq!(sink.kinds(), vec!["reclaim_failed"]);
    }

    #[test]
    fn test_removes_directory_tree() {
        let dir = TempDir::new().unwrap();
        let session = dir.path().join("session-1");
        fs::create_dir_all(&session).unwrap();
        fs::write(session.join("processed_a.csv"), "x").unwrap();
        let sink = RecordingEventSink::new();

        assert!(safe_remove_dir(&session, &fast_policy(), &sink));
        assert!(!session.exists());
    }
}
