/// Non-destructive liveness probe: signal 0 checks existence without
/// delivering anything.
///
/// Only a clean `kill(pid, 0)` counts as alive. ESRCH and EPERM both report
/// not alive; a crashed process must never read as running, and a process we
/// cannot signal is not one we supervise.
#[cfg(unix)]
pub fn pid_is_alive(pid: u32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    // pid 0 would address our own process group.
    if pid <= 0 {
        return false;
    }
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
pub fn pid_is_alive(_pid: u32) -> bool {
    false
}
