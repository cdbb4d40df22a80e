//! Host diagnostics attached to every status post.
//!
//! Each probe is independent: a probe that fails is logged and replaced
//! with a default value, and never aborts the report it belongs to.

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// Opaque key/value bag describing the agent's host.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Map<String, Value>);

impl Diagnostics {
    /// Gathers information about the current host.
    pub fn collect() -> Self {
        let mut diagnostics = Self::default();

        diagnostics.probe("agent_user", Value::from(""), || {
            std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .map(Value::from)
                .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))
        });
        diagnostics.insert("version", Value::from(env!("CARGO_PKG_VERSION")));
        diagnostics.insert(
            "revision",
            Value::from(option_env!("CRUNCH_REVISION").unwrap_or("Unknown")),
        );
        diagnostics.insert("system", Value::from(std::env::consts::OS));
        diagnostics.probe("system_release", Value::from(""), || {
            read_trimmed("/proc/sys/kernel/osrelease").map(Value::from)
        });
        diagnostics.probe("system_version", Value::from(""), || {
            read_trimmed("/proc/sys/kernel/version").map(Value::from)
        });
        diagnostics.insert("machine", Value::from(std::env::consts::ARCH));
        diagnostics.probe("hostname", Value::from(""), || {
            read_trimmed("/proc/sys/kernel/hostname")
                .or_else(|_| std::env::var("HOSTNAME").map_err(|e| io::Error::new(io::ErrorKind::NotFound, e)))
                .map(Value::from)
        });

        let meminfo = fs::read_to_string("/proc/meminfo");
        diagnostics.probe("memory_total", Value::Null, || {
            meminfo_bytes(meminfo.as_ref().map_err(clone_io_error)?, "MemTotal").map(Value::from)
        });
        diagnostics.probe("memory_free", Value::Null, || {
            meminfo_bytes(meminfo.as_ref().map_err(clone_io_error)?, "MemAvailable").map(Value::from)
        });

        let disk = std::env::current_dir().and_then(|directory| disk_usage(&directory));
        diagnostics.probe("disk_total", Value::Null, || {
            disk.as_ref().map(|usage| Value::from(usage.total)).map_err(clone_io_error)
        });
        diagnostics.probe("disk_free", Value::Null, || {
            disk.as_ref().map(|usage| Value::from(usage.free)).map_err(clone_io_error)
        });

        diagnostics
    }

    /// Adds or replaces a value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Looks up a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn probe(&mut self, key: &str, default: Value, probe: impl FnOnce() -> io::Result<Value>) {
        let value = probe().unwrap_or_else(|e| {
            warn!("Diagnostic '{}' unavailable: {}", key, e);
            default
        });
        self.insert(key, value);
    }
}

fn clone_io_error(e: &io::Error) -> io::Error {
    io::Error::new(e.kind(), e.to_string())
}

fn read_trimmed(path: &str) -> io::Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

/// Size and space available to unprivileged users of a filesystem, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DiskUsage {
    total: u64,
    free: u64,
}

#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
fn disk_usage(path: &Path) -> io::Result<DiskUsage> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();
    // SAFETY: `c_path` is NUL-terminated and `stat` is valid for writes.
    if unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: statvfs returned 0, so it filled in `stat`.
    let stat = unsafe { stat.assume_init() };

    let fragment = stat.f_frsize as u64;
    Ok(DiskUsage {
        total: stat.f_blocks as u64 * fragment,
        free: stat.f_bavail as u64 * fragment,
    })
}

#[cfg(not(unix))]
fn disk_usage(_path: &Path) -> io::Result<DiskUsage> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "disk usage is only read on unix"))
}

/// Reads a `/proc/meminfo` field (reported in kB) as bytes.
fn meminfo_bytes(meminfo: &str, field: &str) -> io::Result<u64> {
    meminfo
        .lines()
        .find_map(|line| {
            let (name, rest) = line.split_once(':')?;
            if name.trim() != field {
                return None;
            }
            let kilobytes = rest.split_whitespace().next()?.parse::<u64>().ok()?;
            Some(kilobytes * 1024)
        })
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("{} not in meminfo", field)))
}
