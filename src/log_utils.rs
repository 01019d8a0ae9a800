pub use log::debug;

/// Debug log message which can be forced to stderr by a local flag
///
/// With the flag off the message goes to the debug log level, so it only appears when the global
/// --debug option is given. With the flag on it is printed directly to stderr, which is useful to
/// trace a single estimator without turning on debug output for the whole run.
///
/// # Examples
///
/// ```ignore
/// debug_msg!(false, "Sweep {} improved", x); // debug log only
/// debug_msg!(true, "Sweep {} improved", x); // always printed to stderr
/// ```
macro_rules! debug_msg {
    ($flag:expr, $($arg:tt)+) => {
        if $flag {
            eprintln!($($arg)+);
        } else {
            $crate::log_utils::debug!($($arg)+);
        }
    }
}

pub(crate) use debug_msg;
