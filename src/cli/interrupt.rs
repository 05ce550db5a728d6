//! User cancellation (SIGINT)
//!
//! The handler only raises a flag. Tools call [`check`] between units of
//! work; the lifecycle checks again before loading the configuration and
//! once the tool returns, and turns [`RunError::Interrupted`] into the
//! "aborted" exit.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cli::error::RunError;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_sigint(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT to the cancellation flag.
///
/// The handler is installed without `SA_RESTART`, so a blocking system call
/// in progress returns `EINTR` instead of resuming.
pub fn install() -> io::Result<()> {
    #[cfg(unix)]
    {
        // SAFETY: a zeroed sigaction is a valid "no flags, empty mask" value
        // and the handler only stores to an atomic, which is async-signal-safe.
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t;
            action.sa_flags = 0;
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    Ok(())
}

/// Forget an earlier cancellation; each run starts uninterrupted.
pub fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Request cancellation, as if the user had pressed CTRL-C.
pub fn raise() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

pub fn is_raised() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Fail with [`RunError::Interrupted`] once cancellation was requested.
pub fn check() -> Result<(), RunError> {
    if is_raised() {
        Err(RunError::Interrupted)
    } else {
        Ok(())
    }
}
