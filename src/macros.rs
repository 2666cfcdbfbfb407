//! Crate-local macros.

/// Evaluates the expression between a `Begin` and a `Done` debug log line,
/// reporting how long the evaluation took.
macro_rules! with_debug_logging {
    ($message:expr $(,$arg:expr)*; $expression:expr) => {{
        log::debug!(concat!("Begin: ", $message)$(,$arg)*);
        let _start = ::std::time::Instant::now();
        let _result = $expression;
        log::debug!(
            concat!("Done: ", $message, " ({:.3} ms)")$(,$arg)*,
            _start.elapsed().as_secs_f64() * 1e3
        );
        _result
    }};
}

/// Defines a new type with the given name that identifies something by the
/// [`StringHash`](crate::hash::StringHash) of its name.
///
/// The type gets a `const fn literal` constructor for names known at compile
/// time and a `from_name` constructor for any other name.
macro_rules! stringhash_newtype {
    (
        $(#[$attributes:meta])*
        $([$pub:ident])? $name:ident
    ) => {
        $(#[$attributes])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $($pub)? struct $name($crate::hash::StringHash);

        impl $name {
            /// Creates the identifier for the given string literal at
            /// compile time.
            #[allow(dead_code)]
            $($pub)? const fn literal(name: &'static str) -> Self {
                Self($crate::hash::StringHash::of_literal(name))
            }

            /// Creates the identifier for the given name.
            #[allow(dead_code)]
            $($pub)? fn from_name(name: &str) -> Self {
                Self($crate::hash::StringHash::of_owned(name.to_string()))
            }

            /// Returns the hash of the name.
            #[allow(dead_code)]
            $($pub)? const fn string_hash(&self) -> $crate::hash::StringHash {
                self.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}
