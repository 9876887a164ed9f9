//! Mapping of platform advertise-failure codes onto [`Error`].

use crate::Error;

pub const ADVERTISE_FAILED_DATA_TOO_LARGE: i32 = 1;
pub const ADVERTISE_FAILED_TOO_MANY_ADVERTISERS: i32 = 2;
pub const ADVERTISE_FAILED_ALREADY_STARTED: i32 = 3;
pub const ADVERTISE_FAILED_INTERNAL_ERROR: i32 = 4;
pub const ADVERTISE_FAILED_FEATURE_UNSUPPORTED: i32 = 5;

/// Translate a raw platform failure code into a domain error. Total over
/// `i32`: codes this crate does not know about, including ones newer OS
/// releases may add, degrade to [`Error::FeatureUnsupported`].
pub fn map_failure(code: i32) -> Error {
    match code {
        ADVERTISE_FAILED_DATA_TOO_LARGE => Error::DataTooLarge,
        ADVERTISE_FAILED_TOO_MANY_ADVERTISERS => Error::TooManyAdvertisers,
        ADVERTISE_FAILED_ALREADY_STARTED => Error::AlreadyStarted,
        ADVERTISE_FAILED_INTERNAL_ERROR => Error::InternalError,
        _ => Error::FeatureUnsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_codes() {
        assert_eq!(map_failure(ADVERTISE_FAILED_DATA_TOO_LARGE), Error::DataTooLarge);
        assert_eq!(
            map_failure(ADVERTISE_FAILED_TOO_MANY_ADVERTISERS),
            Error::TooManyAdvertisers
        );
        assert_eq!(map_failure(ADVERTISE_FAILED_ALREADY_STARTED), Error::AlreadyStarted);
        assert_eq!(map_failure(ADVERTISE_FAILED_INTERNAL_ERROR), Error::InternalError);
    }

    #[test]
    fn unknown_codes_degrade_to_unsupported() {
        for code in [ADVERTISE_FAILED_FEATURE_UNSUPPORTED, 0, -1, 6, 42, i32::MAX, i32::MIN] {
            assert_eq!(map_failure(code), Error::FeatureUnsupported);
        }
    }

    #[test]
    fn every_code_maps_to_exactly_one_of_five_kinds() {
        for code in -10..10 {
            let err = map_failure(code);
            assert!(matches!(
                err,
                Error::DataTooLarge
                    | Error::TooManyAdvertisers
                    | Error::AlreadyStarted
                    | Error::InternalError
                    | Error::FeatureUnsupported
            ));
        }
    }
}
