use std::time::Duration;

// Legacy advertising PDU budget. Extended advertising is out of scope.
pub const MAX_ADVERTISEMENT_LEN: usize = 31;

// AD structure framing around the manufacturer data block:
// Flags AD (len, type, flags) + Manufacturer Specific Data AD header
// (len, type) + the 16-bit company code carried inside it.
pub const FLAGS_AD_LEN: usize = 3;
pub const MANUFACTURER_AD_HEADER_LEN: usize = 2;
pub const COMPANY_CODE_LEN: usize = 2;
pub const ADVERTISEMENT_OVERHEAD: usize =
    FLAGS_AD_LEN + MANUFACTURER_AD_HEADER_LEN + COMPANY_CODE_LEN;

pub const AD_TYPE_FLAGS: u8 = 0x01;
pub const AD_TYPE_MANUFACTURER_DATA: u8 = 0xFF;

/// Company code used when a beacon does not carry its own manufacturer.
pub const APPLE_COMPANY_CODE: u16 = 0x004C;

/// The reference iBeacon-style layout: a two-byte type code, a 16-byte
/// region UUID, 16-bit major and minor, and the calibrated power byte.
pub const IBEACON_LAYOUT: &str = "m:2-3=0215,i:4-19,i:20-21,i:22-23,p:24-24";

/// Minimum gap between stopping an active advertisement and submitting the
/// next start. Controllers reject an immediate restart.
pub const RESTART_DEBOUNCE: Duration = Duration::from_millis(200);
