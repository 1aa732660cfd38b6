use std::sync::atomic::{AtomicBool, Ordering};

static WIRE_TRACE: AtomicBool = AtomicBool::new(false);

/// Return true if raw protocol traffic must be mirrored into the `wire` log target.
#[inline(always)]
pub fn is_wire_trace_enabled() -> bool {
    WIRE_TRACE.load(Ordering::SeqCst)
}

pub fn disable_wire_trace() {
    WIRE_TRACE.store(false, Ordering::SeqCst)
}

pub fn enable_wire_trace() {
    WIRE_TRACE.store(true, Ordering::SeqCst)
}

/// Mirror a line of protocol traffic into debug logs (only if wire trace is enabled).
#[macro_export]
macro_rules! wire_trace {
    ($($arg:tt)+) => {
        if $crate::log::is_wire_trace_enabled() {
            log::debug!(target: "wire", $($arg)+)
        }
    };
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "dlvc", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "dlvc", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
