// console.rs — console print facility

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

// ============================================================
// Redirect buffer for con_printf
// ============================================================

static RD_BUFFER: Mutex<Option<String>> = Mutex::new(None);

static DEVELOPER: AtomicBool = AtomicBool::new(false);

/// Begin redirecting print output into a buffer.
pub fn con_begin_redirect() {
    let mut buf = RD_BUFFER.lock();
    *buf = Some(String::new());
}

/// End redirect and return the captured output.
pub fn con_end_redirect() -> Option<String> {
    let mut buf = RD_BUFFER.lock();
    buf.take()
}

// ============================================================
// con_printf / con_dprintf
// ============================================================

/// General-purpose print function. Prints to stdout and appends to the
/// redirect buffer if one is active.
pub fn con_printf(msg: &str) {
    {
        let mut buf = RD_BUFFER.lock();
        if let Some(ref mut s) = *buf {
            s.push_str(msg);
            return;
        }
    }
    print!("{}", msg);
}

/// Developer-only print. Only prints when developer mode is active,
/// mirrored from the "developer" cvar.
pub fn con_dprintf(msg: &str) {
    if !DEVELOPER.load(Ordering::Relaxed) {
        return;
    }
    con_printf(msg);
}

/// Mirror the "developer" cvar into the print facility.
pub fn con_set_developer(on: bool) {
    DEVELOPER.store(on, Ordering::Relaxed);
}

// ============================================================
// Unit tests
// ============================================================
