//! Privilege drop: bind first, then setgid/setuid, then enter the accept
//! loop. Never reorder — every collector socket must already be bound
//! before this runs.

#[cfg(unix)]
mod unix {
    use std::ffi::CString;
    use std::io;

    use crate::error::CollectorError;

    fn resolve_uid(user: &str) -> io::Result<libc::uid_t> {
        let cstr = CString::new(user)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "user name contains NUL"))?;
        let pwd = unsafe { libc::getpwnam(cstr.as_ptr()) };
        if pwd.is_null() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown user {user:?}"),
            ));
        }
        Ok(unsafe { (*pwd).pw_uid })
    }

    fn resolve_gid(group: &str) -> io::Result<libc::gid_t> {
        let cstr = CString::new(group)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "group name contains NUL"))?;
        let grp = unsafe { libc::getgrnam(cstr.as_ptr()) };
        if grp.is_null() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("unknown group {group:?}"),
            ));
        }
        Ok(unsafe { (*grp).gr_gid })
    }

    /// Drops to the configured group, then user. Call only after every
    /// collector has successfully bound its socket.
    pub fn drop_privileges(user: Option<&str>, group: Option<&str>) -> Result<(), CollectorError> {
        let to_error = |source: io::Error| CollectorError::PrivilegeDrop {
            user: user.map(str::to_string),
            group: group.map(str::to_string),
            source,
        };

        if let Some(group) = group {
            let gid = resolve_gid(group).map_err(to_error)?;
            if unsafe { libc::setgid(gid) } != 0 {
                return Err(to_error(io::Error::last_os_error()));
            }
        }

        if let Some(user) = user {
            let uid = resolve_uid(user).map_err(to_error)?;
            if unsafe { libc::setuid(uid) } != 0 {
                return Err(to_error(io::Error::last_os_error()));
            }
        }

        Ok(())
    }
}

#[cfg(unix)]
pub use unix::drop_privileges;

/// On non-Unix targets privilege drop is a no-op; `user`/`group` being set
/// there is a configuration error the caller is expected to have already
/// rejected, not something this module silently ignores at runtime.
#[cfg(not(unix))]
pub fn drop_privileges(
    _user: Option<&str>,
    _group: Option<&str>,
) -> Result<(), crate::error::CollectorError> {
    Ok(())
}
