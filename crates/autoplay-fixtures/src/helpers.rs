//! Common test helper functions.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Create a unique temporary directory for a test.
///
/// The name carries a timestamp and a process-wide counter so parallel tests
/// never collide. The directory is created immediately.
///
/// # Panics
///
/// Panics if the directory cannot be created.
#[must_use]
pub fn temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let seq = COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!(
        "autoplay-{prefix}-{}-{stamp}-{seq}",
        std::process::id()
    ));

    fs::create_dir_all(&dir).expect("failed to create temp directory");

    dir
}

/// Write `contents` to `dir/name` and return the path.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_file(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("failed to write fixture file");
    path
}

/// Write `value` as pretty JSON to `dir/name` and return the path.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_json(dir: &Path, name: &str, value: &serde_json::Value) -> PathBuf {
    let data = serde_json::to_vec_pretty(value).expect("failed to serialize fixture");
    write_file(dir, name, data)
}
