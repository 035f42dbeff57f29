//! Target user resolution and the in-child privilege drop

use std::ffi::CString;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

use nix::errno::Errno;
use nix::unistd::{self, Gid, Uid, User};
use tracing::debug;

use super::error::ExecError;

/// A system user resolved from the passwd/group databases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub uid: Uid,
    pub gid: Gid,
    /// Supplementary groups, including the primary group
    pub groups: Vec<Gid>,
    pub home: PathBuf,
}

impl Identity {
    /// Look up `name`. Not cached: every call hits the system databases.
    pub fn resolve(name: &str) -> Result<Self, ExecError> {
        let user = User::from_name(name)
            .map_err(|e| ExecError::identity(name, format!("user lookup failed: {e}")))?
            .ok_or_else(|| ExecError::identity(name, "user not found on the system"))?;

        let groups = supplementary_groups(name, user.gid)?;

        debug!(user = name, uid = %user.uid, gid = %user.gid, "resolved identity");

        Ok(Self {
            name: name.to_string(),
            uid: user.uid,
            gid: user.gid,
            groups,
            home: user.dir,
        })
    }

    /// Variables that make the child see itself as this user
    pub fn env_vars(&self) -> [(&'static str, String); 3] {
        [
            ("HOME", self.home.to_string_lossy().into_owned()),
            ("USER", self.name.clone()),
            ("LOGNAME", self.name.clone()),
        ]
    }

    fn matches_current(&self) -> bool {
        self.uid == unistd::geteuid() && self.gid == unistd::getegid()
    }
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
fn supplementary_groups(name: &str, gid: Gid) -> Result<Vec<Gid>, ExecError> {
    let cname = CString::new(name)
        .map_err(|_| ExecError::identity(name, "user name contains a NUL byte"))?;
    unistd::getgrouplist(&cname, gid)
        .map_err(|e| ExecError::identity(name, format!("group lookup failed: {e}")))
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn supplementary_groups(name: &str, gid: Gid) -> Result<Vec<Gid>, ExecError> {
    CString::new(name).map_err(|_| ExecError::identity(name, "user name contains a NUL byte"))?;
    Ok(vec![gid])
}

/// Credentials the child must take on before exec
#[derive(Debug, Clone)]
pub(crate) struct PrivilegeDrop {
    uid: Uid,
    gid: Gid,
    groups: Vec<Gid>,
}

impl PrivilegeDrop {
    /// Decide whether switching to `identity` needs a privilege change, and
    /// whether this process is allowed to make it.
    pub(crate) fn for_identity(identity: &Identity) -> Result<Option<Self>, ExecError> {
        if identity.matches_current() {
            return Ok(None);
        }

        if !unistd::geteuid().is_root() {
            return Err(ExecError::identity(
                &identity.name,
                "this operation requires root privileges",
            ));
        }

        Ok(Some(Self {
            uid: identity.uid,
            gid: identity.gid,
            groups: identity.groups.clone(),
        }))
    }

    /// Register the drop as a pre-exec hook on `cmd`.
    ///
    /// Any failure inside the hook aborts the child before exec; spawn then
    /// reports `EPERM`.
    pub(crate) fn install(self, cmd: &mut Command) {
        // SAFETY: the hook only issues set*id/setgroups syscalls on data
        // allocated before fork; it neither allocates nor takes locks.
        unsafe {
            cmd.pre_exec(move || {
                self.apply()
                    .map_err(|_| io::Error::from_raw_os_error(Errno::EPERM as i32))
            });
        }
    }

    fn apply(&self) -> nix::Result<()> {
        #[cfg(not(any(target_os = "macos", target_os = "ios")))]
        unistd::setgroups(&self.groups)?;
        unistd::setgid(self.gid)?;
        unistd::setuid(self.uid)?;

        // The drop must not be reversible
        if !self.uid.is_root() && unistd::setuid(Uid::from_raw(0)).is_ok() {
            return Err(Errno::EPERM);
        }
        Ok(())
    }
}

/// Whether a spawn error came from the privilege-drop hook
pub(crate) fn is_drop_failure(err: &io::Error) -> bool {
    err.raw_os_error() == Some(Errno::EPERM as i32)
}
