#![allow(unused_macros, unused_imports)]

#[cfg(feature = "tracing")]
macro_rules! trace {
    ($($args:tt)*) => {{
        use tracing::trace;
        trace!($($args)*)
    }};
}
#[cfg(not(feature = "tracing"))]
macro_rules! trace {
    ($($args:tt)*) => {{
        if false {
            let _args = format_args!($($args)*);
        }
    }};
}
pub(crate) use trace;

#[cfg(feature = "tracing")]
macro_rules! debug {
    ($($args:tt)*) => {{
        use tracing::debug;
        debug!($($args)*)
    }};
}
#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($args:tt)*) => {{
        if false {
            let _args = format_args!($($args)*);
        }
    }};
}
pub(crate) use debug;

#[cfg(feature = "tracing")]
macro_rules! warn_ {
    ($($args:tt)*) => {{
        use tracing::warn;
        warn!($($args)*)
    }};
}
#[cfg(not(feature = "tracing"))]
macro_rules! warn_ {
    ($($args:tt)*) => {{
        if false {
            let _args = format_args!($($args)*);
        }
    }};
}
pub(crate) use warn_ as warn;

#[cfg(feature = "tracing")]
pub(crate) use tracing::instrument;
