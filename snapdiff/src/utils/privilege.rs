//! Refuse to run with differing real and effective ids.

use nix::unistd::{getegid, geteuid, getgid, getuid};

use super::errors::{Result, SnapError};

/// Fails when the process runs suid or sgid. Must be called before any
/// filesystem mutation.
pub fn ensure_unprivileged() -> Result<()> {
    let (uid, euid) = (getuid(), geteuid());
    let (gid, egid) = (getgid(), getegid());

    if uid != euid || gid != egid {
        return Err(SnapError::UnsafePrivileges {
            uid: uid.as_raw(),
            euid: euid.as_raw(),
            gid: gid.as_raw(),
            egid: egid.as_raw(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_process_passes() {
        // The test harness is never installed setuid.
        assert!(ensure_unprivileged().is_ok());
    }
}
