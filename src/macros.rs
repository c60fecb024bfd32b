//! Assertion and registration macros.
//!
//! The `check*!` macros record the literal source of the checked
//! expression together with the file and line they appear on.

/// Declares the enclosing file as a source unit.
///
/// ```ignore
/// fn register(registry: &mut suitest::Registry) { /* ... */ }
///
/// suitest::source_unit!(register);
/// ```
#[macro_export]
macro_rules! source_unit {
    ($register:path) => {
        pub const SOURCE_UNIT: $crate::SourceUnit = $crate::SourceUnit::new(file!(), $register);
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __here {
    () => {
        $crate::framework::SourceLocation::new(file!(), line!())
    };
}

/// Checks that a boolean expression holds.
///
/// ```
/// # use suitest::{check, capture::TestContext};
/// let ctx = TestContext::detached("Doc::check");
/// let items = vec![1, 2];
/// assert!(check!(ctx, items.len() == 2).is_ok());
/// assert!(check!(ctx, items.is_empty(), "expected no items").is_err());
/// ```
#[macro_export]
macro_rules! check {
    ($ctx:expr, $cond:expr $(,)?) => {
        $ctx.check($crate::__here!(), stringify!($cond))
            .ok($cond, ::std::string::String::new())
    };
    ($ctx:expr, $cond:expr, $($msg:tt)+) => {
        $ctx.check($crate::__here!(), stringify!($cond))
            .ok($cond, format!($($msg)+))
    };
}

/// Checks that two expressions are equal.
#[macro_export]
macro_rules! check_eq {
    ($ctx:expr, $left:expr, $right:expr $(,)?) => {
        $ctx.check(
            $crate::__here!(),
            concat!(stringify!($left), " == ", stringify!($right)),
        )
        .equal(&$left, &$right, ::std::string::String::new())
    };
    ($ctx:expr, $left:expr, $right:expr, $($msg:tt)+) => {
        $ctx.check(
            $crate::__here!(),
            concat!(stringify!($left), " == ", stringify!($right)),
        )
        .equal(&$left, &$right, format!($($msg)+))
    };
}

/// Checks that two expressions differ.
#[macro_export]
macro_rules! check_ne {
    ($ctx:expr, $left:expr, $right:expr $(,)?) => {
        $ctx.check(
            $crate::__here!(),
            concat!(stringify!($left), " != ", stringify!($right)),
        )
        .not_equal(&$left, &$right, ::std::string::String::new())
    };
    ($ctx:expr, $left:expr, $right:expr, $($msg:tt)+) => {
        $ctx.check(
            $crate::__here!(),
            concat!(stringify!($left), " != ", stringify!($right)),
        )
        .not_equal(&$left, &$right, format!($($msg)+))
    };
}

/// Checks that a `Result` expression is an error.
#[macro_export]
macro_rules! check_throws {
    ($ctx:expr, $result:expr $(,)?) => {
        $ctx.check($crate::__here!(), stringify!($result))
            .throws($result, ::std::string::String::new())
    };
    ($ctx:expr, $result:expr, $($msg:tt)+) => {
        $ctx.check($crate::__here!(), stringify!($result))
            .throws($result, format!($($msg)+))
    };
}
