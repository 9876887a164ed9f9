//! The types and traits that make up the public surface of the crate.
//!
//! [`Beacon`] and [`BeaconLayout`] describe *what* to advertise and *how* the
//! identity maps onto bytes; [`Advertiser`] and [`CapabilityGate`] are the
//! seams a platform backend implements; everything else is plumbing shared by
//! the codec and the session.

pub mod layout;

pub use layout::{BeaconLayout, FieldRole, FieldSpec};

use std::fmt::{self, Debug, Display, Formatter};

use async_trait::async_trait;
use bitflags::bitflags;
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_cr as serde;

use crate::constants::{
    AD_TYPE_FLAGS, AD_TYPE_MANUFACTURER_DATA, ADVERTISEMENT_OVERHEAD, COMPANY_CODE_LEN,
};
use crate::Result;

const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;
const BLUETOOTH_BASE_MASK_16: u128 = 0xffff0000_ffff_ffff_ffff_ffffffffffff;

/// Expand a 16-bit short UUID into a full 128-bit UUID on the Bluetooth Base
/// UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// If the UUID sits on the Bluetooth Base UUID, return its 16-bit short form.
pub fn uuid_to_u16(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    if value & BLUETOOTH_BASE_MASK_16 == BLUETOOTH_BASE_UUID {
        Some((value >> 96) as u16)
    } else {
        None
    }
}

/// One beacon identifier value: a byte sequence in canonical big-endian
/// order. Typically a 16-byte region UUID or a 16-bit major/minor.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Identifier(Vec<u8>);

impl Identifier {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Identifier(bytes.to_vec())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Identifier(uuid.as_bytes().to_vec())
    }

    pub fn from_u16(value: u16) -> Self {
        Identifier(value.to_be_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The identifier as a UUID, if it is 16 bytes long.
    pub fn to_uuid(&self) -> Option<Uuid> {
        <[u8; 16]>::try_from(self.0.as_slice())
            .ok()
            .map(Uuid::from_bytes)
    }

    /// The identifier as an unsigned integer, if it is at most 2 bytes long.
    pub fn to_u16(&self) -> Option<u16> {
        match self.0.as_slice() {
            [lo] => Some(*lo as u16),
            [hi, lo] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }
}

impl From<Uuid> for Identifier {
    fn from(uuid: Uuid) -> Self {
        Identifier::from_uuid(uuid)
    }
}

impl From<u16> for Identifier {
    fn from(value: u16) -> Self {
        Identifier::from_u16(value)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if let Some(uuid) = self.to_uuid() {
            return Display::fmt(&uuid, f);
        }
        if let Some(value) = self.to_u16() {
            return write!(f, "{}", value);
        }
        write!(f, "0x")?;
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Debug for Identifier {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

/// A beacon identity: the ordered identifier values plus the calibrated
/// power and the optional framing attributes. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    identifiers: Vec<Identifier>,
    tx_power: i8,
    manufacturer: Option<u16>,
    service_uuid: Option<Uuid>,
    local_name: Option<String>,
    data_fields: Vec<Vec<u8>>,
}

impl Beacon {
    pub fn builder() -> BeaconBuilder {
        BeaconBuilder::default()
    }

    pub fn identifiers(&self) -> &[Identifier] {
        &self.identifiers
    }

    /// The calibrated reference power broadcast with the beacon, in dBm.
    pub fn tx_power(&self) -> i8 {
        self.tx_power
    }

    pub fn manufacturer(&self) -> Option<u16> {
        self.manufacturer
    }

    pub fn service_uuid(&self) -> Option<Uuid> {
        self.service_uuid
    }

    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    pub fn data_fields(&self) -> &[Vec<u8>] {
        &self.data_fields
    }
}

impl Display for Beacon {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Beacon[")?;
        for (i, id) in self.identifiers.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "id{}: {}", i + 1, id)?;
        }
        write!(f, " txPower: {}]", self.tx_power)
    }
}

/// Builder for [`Beacon`]. The calibrated power defaults to -59 dBm, the
/// conventional value for a one-meter reference.
#[derive(Debug, Clone)]
pub struct BeaconBuilder {
    identifiers: Vec<Identifier>,
    tx_power: i8,
    manufacturer: Option<u16>,
    service_uuid: Option<Uuid>,
    local_name: Option<String>,
    data_fields: Vec<Vec<u8>>,
}

impl Default for BeaconBuilder {
    fn default() -> Self {
        BeaconBuilder {
            identifiers: Vec::new(),
            tx_power: -59,
            manufacturer: None,
            service_uuid: None,
            local_name: None,
            data_fields: Vec::new(),
        }
    }
}

impl BeaconBuilder {
    /// Append an identifier. Order matters; identifiers pair up with the
    /// layout's identifier fields by position.
    pub fn identifier(mut self, identifier: impl Into<Identifier>) -> Self {
        self.identifiers.push(identifier.into());
        self
    }

    pub fn uuid(self, uuid: Uuid) -> Self {
        self.identifier(uuid)
    }

    pub fn major(self, major: u16) -> Self {
        self.identifier(major)
    }

    pub fn minor(self, minor: u16) -> Self {
        self.identifier(minor)
    }

    pub fn tx_power(mut self, tx_power: i8) -> Self {
        self.tx_power = tx_power;
        self
    }

    pub fn manufacturer(mut self, company_code: u16) -> Self {
        self.manufacturer = Some(company_code);
        self
    }

    pub fn service_uuid(mut self, uuid: Uuid) -> Self {
        self.service_uuid = Some(uuid);
        self
    }

    pub fn local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    /// Append a value for the layout's next data field.
    pub fn data_field(mut self, data: Vec<u8>) -> Self {
        self.data_fields.push(data);
        self
    }

    pub fn build(self) -> Beacon {
        Beacon {
            identifiers: self.identifiers,
            tx_power: self.tx_power,
            manufacturer: self.manufacturer,
            service_uuid: self.service_uuid,
            local_name: self.local_name,
            data_fields: self.data_fields,
        }
    }
}

/// Power-versus-latency trade-off for the advertising interval.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    LowLatency,
}

impl AdvertiseMode {
    pub fn from_i32(v: i32) -> Option<AdvertiseMode> {
        match v {
            0 => Some(AdvertiseMode::LowPower),
            1 => Some(AdvertiseMode::Balanced),
            2 => Some(AdvertiseMode::LowLatency),
            _ => None,
        }
    }

    pub fn num(&self) -> i32 {
        match *self {
            AdvertiseMode::LowPower => 0,
            AdvertiseMode::Balanced => 1,
            AdvertiseMode::LowLatency => 2,
        }
    }
}

/// Radio transmit power level for the advertisement.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPowerLevel {
    UltraLow,
    Low,
    Medium,
    High,
}

impl TxPowerLevel {
    pub fn from_i32(v: i32) -> Option<TxPowerLevel> {
        match v {
            0 => Some(TxPowerLevel::UltraLow),
            1 => Some(TxPowerLevel::Low),
            2 => Some(TxPowerLevel::Medium),
            3 => Some(TxPowerLevel::High),
            _ => None,
        }
    }

    pub fn num(&self) -> i32 {
        match *self {
            TxPowerLevel::UltraLow => 0,
            TxPowerLevel::Low => 1,
            TxPowerLevel::Medium => 2,
            TxPowerLevel::High => 3,
        }
    }
}

/// Optional advertising parameters. Unset fields keep the platform default.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitSettings {
    pub mode: Option<AdvertiseMode>,
    pub tx_power_level: Option<TxPowerLevel>,
}

bitflags! {
    /// The Flags AD structure bits carried ahead of the manufacturer data.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AdFlags: u8 {
        const LIMITED_DISCOVERABLE = 0x01;
        const GENERAL_DISCOVERABLE = 0x02;
        const BR_EDR_NOT_SUPPORTED = 0x04;
    }
}

/// The encoded advertisement handed to the platform primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisementPayload {
    /// 16-bit company code carried ahead of the manufacturer data block.
    pub company_code: u16,
    /// The manufacturer-specific data block, company code excluded.
    pub manufacturer_data: Vec<u8>,
    /// Service UUID to advertise alongside the manufacturer data, if the
    /// layout declares one.
    pub service_uuid: Option<Uuid>,
}

impl AdvertisementPayload {
    /// Total size of the advertisement once framed, AD headers included.
    pub fn total_len(&self) -> usize {
        ADVERTISEMENT_OVERHEAD + self.manufacturer_data.len()
    }

    /// Assemble the full legacy advertising PDU payload: Flags AD followed
    /// by the Manufacturer Specific Data AD. For backends that submit raw
    /// bytes rather than structured advertise data.
    pub fn advertising_bytes(&self) -> Vec<u8> {
        let flags = AdFlags::GENERAL_DISCOVERABLE | AdFlags::BR_EDR_NOT_SUPPORTED;
        let mut bytes = Vec::with_capacity(self.total_len());
        bytes.extend_from_slice(&[2, AD_TYPE_FLAGS, flags.bits()]);
        bytes.push((1 + COMPANY_CODE_LEN + self.manufacturer_data.len()) as u8);
        bytes.push(AD_TYPE_MANUFACTURER_DATA);
        bytes.extend_from_slice(&self.company_code.to_le_bytes());
        bytes.extend_from_slice(&self.manufacturer_data);
        bytes
    }
}

/// Invoked exactly once by the platform when an advertise-start request
/// resolves. `Err` carries the platform's raw failure code.
pub type AdvertiseCallback = Box<dyn FnOnce(std::result::Result<(), i32>) + Send + 'static>;

/// The platform advertising primitive. At most one advertisement is active
/// per process; [`crate::session::Transmitter`] enforces that discipline, an
/// implementation only has to submit and cancel requests.
#[async_trait]
pub trait Advertiser: Send + Sync {
    /// Submit an advertise-start request. Returning `Ok` means the request
    /// was accepted; the outcome arrives later through `on_result`, possibly
    /// from a different execution context.
    async fn start_advertising(
        &self,
        payload: &AdvertisementPayload,
        settings: &TransmitSettings,
        on_result: AdvertiseCallback,
    ) -> Result<()>;

    /// Cancel the active advertisement. Cancellation has no failure path.
    async fn stop_advertising(&self);
}

/// Pre-flight capability queries against the OS/driver. All pure; stubbed
/// out in tests.
pub trait CapabilityGate: Send + Sync {
    fn is_advertising_supported(&self) -> bool;
    fn has_advertise_permission(&self) -> bool;
    fn is_bluetooth_enabled(&self) -> bool;
}

/// Lifecycle of one advertising attempt.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Advertising,
    StoppingForRestart,
    Failed,
}

/// Emitted on every session state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
}
