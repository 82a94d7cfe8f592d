use std::sync::OnceLock;

use crate::restore::CancelToken;

/// Token cancelled on first SIGINT/SIGTERM.
static SHUTDOWN: OnceLock<CancelToken> = OnceLock::new();

/// Install signal handlers for cooperative shutdown and return the token
/// they cancel.
///
/// First signal cancels the token and restores the default handler so a
/// second signal terminates immediately.
pub fn install_signal_handlers() -> CancelToken {
    let token = SHUTDOWN.get_or_init(CancelToken::new).clone();

    #[cfg(unix)]
    {
        // Safety: signal handler only sets an atomic bool and restores default handler.
        unsafe {
            libc::signal(
                libc::SIGTERM,
                unix_signal_handler as *const () as libc::sighandler_t,
            );
            libc::signal(
                libc::SIGINT,
                unix_signal_handler as *const () as libc::sighandler_t,
            );
        }
    }

    token
}

#[cfg(unix)]
extern "C" fn unix_signal_handler(sig: libc::c_int) {
    if let Some(token) = SHUTDOWN.get() {
        token.cancel();
    }
    // Restore default handler so a second signal kills immediately
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
    }
}
