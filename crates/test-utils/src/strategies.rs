//! Proptest strategies for Clonewatch inputs.
//!
//! # Usage
//!
//! ```no_run
//! use clonewatch_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(email in strategies::arb_email()) {
//!         // test invariant with a randomly generated owner address
//!     }
//! }
//! ```

use proptest::prelude::*;

/// Generates a syntactically valid owner email such as `k3x.q@mail.example.com`.
pub fn arb_email() -> impl Strategy<Value = String> {
    ("[a-z][a-z0-9]{0,11}(\\.[a-z0-9]{1,6})?", "[a-z][a-z0-9]{0,9}", prop::sample::select(vec![
        "com", "org", "net", "io", "example",
    ]))
        .prop_map(|(local, host, tld)| format!("{local}@{host}.{tld}"))
}

/// Generates an origin in `scheme://host[:port]` form.
pub fn arb_origin() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["http", "https"]),
        "[a-z][a-z0-9-]{0,14}[a-z0-9]\\.(com|net|example|dev)",
        prop::option::of(1024u16..65535),
    )
        .prop_map(|(scheme, host, port)| match port {
            Some(port) => format!("{scheme}://{host}:{port}"),
            None => format!("{scheme}://{host}"),
        })
}

/// Generates an origin with a markup payload appended.
pub fn arb_markup_origin() -> impl Strategy<Value = String> {
    (
        arb_origin(),
        prop::sample::select(vec![
            "<script>alert(1)</script>",
            "<img src=x onerror=alert(1)>",
            "<a href=\"javascript:void(0)\">x</a>",
            "<svg/onload=alert(1)",
        ]),
    )
        .prop_map(|(origin, payload)| format!("{origin}{payload}"))
}
