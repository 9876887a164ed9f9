//! beacontx is a library for broadcasting iBeacon/AltBeacon-style proximity
//! beacon advertisements over BLE legacy advertising.
//!
//! The crate is split along the same lines as the problem:
//!
//! - [`api`] holds the public value types ([`api::Beacon`],
//!   [`api::BeaconLayout`], [`api::TransmitSettings`]) and the traits the
//!   platform has to provide ([`api::Advertiser`], [`api::CapabilityGate`]).
//! - [`common::codec`] turns a beacon identity into manufacturer-specific
//!   advertisement bytes and back, driven by a declarative byte layout.
//! - [`session`] owns the advertising lifecycle: serialized start/stop, the
//!   debounced restart when an advertisement is already active, and the
//!   mapping of platform failure codes into [`Error`].
//! - [`bridge`] exposes the start/stop/isBroadcasting surface over key/value
//!   description maps, for callers that marshal requests as JSON-shaped maps.
//!
//! The platform advertising primitive itself is injected: implement
//! [`api::Advertiser`] on top of whatever OS/driver surface is available and
//! hand it to [`session::Transmitter`].

use thiserror::Error;

pub mod api;
pub mod bridge;
pub mod common;
pub mod session;

mod constants;

pub use crate::constants::{APPLE_COMPANY_CODE, IBEACON_LAYOUT};

/// The error enum returned by every fallible operation in this crate.
///
/// Callers distinguish failures on the variant (or on the stable code string
/// from [`Error::kind`]), never on the message text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Advertising is not supported on this platform")]
    FeatureUnsupported,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Malformed beacon layout: {0}")]
    MalformedLayout(String),

    #[error("Layout declares {expected} identifier fields but the beacon supplies {actual}")]
    IdentifierCountMismatch { expected: usize, actual: usize },

    #[error("Advertisement of {size} bytes exceeds the {max} byte maximum")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Bytes do not match the expected beacon layout")]
    LayoutMismatch,

    #[error("Advertisement data too large for the controller")]
    DataTooLarge,

    #[error("No advertising instance is available")]
    TooManyAdvertisers,

    #[error("Advertising has already been started")]
    AlreadyStarted,

    #[error("Internal advertising error")]
    InternalError,
}

impl Error {
    /// A stable, machine-readable code for this error. These strings are part
    /// of the boundary contract and never change, unlike the display message.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::FeatureUnsupported => "FEATURE_UNSUPPORTED",
            Error::InvalidParameter(_) => "INVALID_PARAMETER",
            Error::MalformedLayout(_) => "MALFORMED_LAYOUT",
            Error::IdentifierCountMismatch { .. } => "IDENTIFIER_COUNT_MISMATCH",
            Error::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Error::LayoutMismatch => "LAYOUT_MISMATCH",
            Error::DataTooLarge => "DATA_TOO_LARGE",
            Error::TooManyAdvertisers => "TOO_MANY_ADVERTISERS",
            Error::AlreadyStarted => "ALREADY_STARTED",
            Error::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// Ensure that the exported types implement all the expected traits.
use static_assertions::assert_impl_all;
use std::fmt::Debug;

assert_impl_all!(Error: Clone, Debug, Send, Sync);
assert_impl_all!(api::Beacon: Clone, Debug, Eq, Send, Sync);
assert_impl_all!(api::BeaconLayout: Clone, Debug, Eq, Send, Sync);
assert_impl_all!(api::TransmitSettings: Clone, Copy, Debug, Default, Send, Sync);
assert_impl_all!(api::AdvertisementPayload: Clone, Debug, Eq, Send, Sync);
