//! Shared `Result` alias for chat-relay.
//!
//! Crates keep their own error enums (`StoreError`, `UpstreamError`,
//! `DecodeError`, ...). Operations that cross a network boundary wrap those
//! enums in a rootcause `Report` so callers can attach context with
//! `.context()` before the error reaches the HTTP layer.

use rootcause::Report;

/// Result carrying a rootcause report whose current context is `C`.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Unreachable;

    impl fmt::Display for Unreachable {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "upstream unreachable")
        }
    }

    impl std::error::Error for Unreachable {}

    fn open(reachable: bool) -> Result<u16, Unreachable> {
        if reachable {
            Ok(200)
        } else {
            Err(Unreachable.into())
        }
    }

    #[test]
    fn ok_passes_through() {
        assert_eq!(open(true).expect("should be ok"), 200);
    }

    #[test]
    fn report_displays_context() {
        let err = open(false).unwrap_err();
        assert!(err.to_string().contains("upstream unreachable"));
    }
}
