//! Error conversion implementations.
//!
//! `Read`/`Seek` implementations must speak `io::Error`, so format errors
//! raised while streaming are wrapped as `InvalidData` and unwrapped again on
//! the way back into [`Error`].

use super::types::Error;
use std::io;

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::Argument(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            Error::ItemNotFound(_) => io::Error::new(io::ErrorKind::NotFound, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// Recover a crate error that was tunnelled through an `io::Error`.
pub(crate) fn unwrap_io_error(err: io::Error) -> Error {
    if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => Error::Io(io::Error::other(other)),
            None => Error::Io(io::Error::other("unknown IO error")),
        }
    } else {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_round_trips_through_io() {
        let io_err: io::Error = Error::format("broken chain").into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
        let back = unwrap_io_error(io_err);
        assert!(back.is_format());
        assert_eq!(back.to_string(), "Invalid format: broken chain");
    }

    #[test]
    fn test_plain_io_error_is_preserved() {
        let err = unwrap_io_error(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        match err {
            Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
