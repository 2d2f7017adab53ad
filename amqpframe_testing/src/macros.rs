//! Assertion macros shared by test helpers and integration tests.

/// Await a broker-side future and panic with contextual diagnostics on
/// failure.
#[macro_export]
macro_rules! broker_expect {
    ($fut:expr) => {{
        $fut.await
            .expect(concat!("broker step failed at ", file!(), ":", line!()))
    }};
    ($fut:expr, $msg:expr) => {{
        let m = ::std::format!("{msg} at {}:{}", file!(), line!(), msg = $msg);
        $fut.await.expect(&m)
    }};
}

/// Await a client operation and panic with contextual diagnostics on
/// failure.
#[macro_export]
macro_rules! client_expect {
    ($fut:expr) => {{
        $fut.await
            .expect(concat!("client call failed at ", file!(), ":", line!()))
    }};
    ($fut:expr, $msg:expr) => {{
        let m = ::std::format!("{msg} at {}:{}", file!(), line!(), msg = $msg);
        $fut.await.expect(&m)
    }};
}

pub use crate::{broker_expect, client_expect};
