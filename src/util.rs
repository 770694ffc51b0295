//! Internal utilities.

use std::ffi::CString;
use std::io;

/// Resolves `user` (a name or a numeric uid) to a uid.
///
/// Returns `Ok(None)` if no such user exists.
pub(crate) fn lookup_uid(user: &str) -> io::Result<Option<u32>> {
    if let Ok(uid) = user.parse::<u32>() {
        return Ok(Some(uid));
    }
    let Ok(name) = CString::new(user) else {
        return Ok(None);
    };

    let mut buf: Vec<libc::c_char> = vec![0; 1024];
    loop {
        // SAFETY: `passwd` is plain old data, zeroed is a valid value.
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut found: *mut libc::passwd = std::ptr::null_mut();
        // SAFETY: every pointer is valid for the duration of the call and
        // `buf.len()` is the true size of `buf`. Strings in `pwd` point into
        // `buf`, which outlives the only field read afterwards.
        let rc = unsafe {
            libc::getpwnam_r(
                name.as_ptr(),
                &mut pwd,
                buf.as_mut_ptr(),
                buf.len(),
                &mut found,
            )
        };
        match rc {
            0 if found.is_null() => return Ok(None),
            0 => return Ok(Some(pwd.pw_uid)),
            libc::ERANGE if buf.len() < 1 << 20 => buf.resize(buf.len() * 2, 0),
            _ => return Err(io::Error::from_raw_os_error(rc)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_resolves_by_name_and_number() {
        assert_eq!(lookup_uid("root").unwrap(), Some(0));
        assert_eq!(lookup_uid("0").unwrap(), Some(0));
        assert_eq!(lookup_uid("1000").unwrap(), Some(1000));
    }

    #[test]
    fn unknown_user_is_none() {
        assert_eq!(lookup_uid("no-such-dnsconfd-user").unwrap(), None);
        assert_eq!(lookup_uid("bad\0name").unwrap(), None);
    }
}
