//! Process information lookups.
//!
//! Maps a pid to the path of its executable. Supported on Linux through
//! `/proc/<pid>/exe`; other platforms always return an empty path.

/// Executable path of `pid`, empty if unknown or unsupported.
#[cfg(target_os = "linux")]
pub fn executable_path(pid: u32) -> String {
    if pid == 0 {
        return String::new();
    }
    let Ok(pid) = i32::try_from(pid) else {
        return String::new();
    };
    procfs::process::Process::new(pid)
        .and_then(|process| process.exe())
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Executable path of `pid`, empty if unknown or unsupported.
#[cfg(not(target_os = "linux"))]
pub fn executable_path(_pid: u32) -> String {
    String::new()
}

/// Returns true if executable lookup is available on this platform.
pub fn is_supported() -> bool {
    cfg!(target_os = "linux")
}
