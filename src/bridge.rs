//! The inbound boundary for callers that marshal requests as JSON-shaped
//! key/value maps (a plugin channel, an RPC layer, a config file).
//!
//! A beacon description map carries the identity under either an ordered
//! `identifiers` list or the conventional `proximityUUID`/`major`/`minor`
//! keys, plus optional `txPower`, `manufacturerId`, `serviceUuid` and
//! `localName`. Transmit settings arrive separately as `advertisingMode` and
//! `advertisingTxPowerLevel` integer codes. Anything malformed is rejected
//! with [`Error::InvalidParameter`] before the session is involved.

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::api::layout::decode_hex;
use crate::api::{
    AdvertiseMode, Advertiser, Beacon, BeaconLayout, CapabilityGate, Identifier, TransmitSettings,
    TxPowerLevel,
};
use crate::session::Transmitter;
use crate::{Error, Result};

/// Map-based facade over a [`Transmitter`]. One instance per process is the
/// expected shape; it owns the session for its whole lifetime.
pub struct BeaconBroadcast<A, G>
where
    A: Advertiser,
    G: CapabilityGate,
{
    transmitter: Transmitter<A, G>,
}

impl<A, G> BeaconBroadcast<A, G>
where
    A: Advertiser,
    G: CapabilityGate,
{
    pub fn new(advertiser: A, gate: G, layout: BeaconLayout) -> Self {
        BeaconBroadcast {
            transmitter: Transmitter::new(advertiser, gate, layout),
        }
    }

    pub fn transmitter(&self) -> &Transmitter<A, G> {
        &self.transmitter
    }

    /// Start broadcasting the beacon described by `beacon_args`, with
    /// optional transmit settings. Resolves when the platform reports the
    /// outcome.
    pub async fn start_broadcast(
        &self,
        beacon_args: &Value,
        settings_args: Option<&Value>,
    ) -> Result<()> {
        let map = as_map(beacon_args)?;
        let beacon = beacon_from_map(map)?;
        let settings = match settings_args {
            Some(Value::Null) | None => TransmitSettings::default(),
            Some(value) => settings_from_map(as_map(value)?)?,
        };
        self.transmitter.start(&beacon, settings).await
    }

    /// Stop broadcasting. Always succeeds, including when nothing is active.
    pub async fn stop_broadcast(&self) -> Result<()> {
        self.transmitter.stop().await
    }

    pub fn is_broadcasting(&self) -> bool {
        self.transmitter.is_broadcasting()
    }

    pub fn is_advertising_supported(&self) -> bool {
        self.transmitter.gate().is_advertising_supported()
    }

    pub fn has_advertise_permission(&self) -> bool {
        self.transmitter.gate().has_advertise_permission()
    }

    pub fn is_bluetooth_enabled(&self) -> bool {
        self.transmitter.gate().is_bluetooth_enabled()
    }
}

fn as_map(value: &Value) -> Result<&Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| Error::InvalidParameter("arguments must be a map".into()))
}

/// Build a [`Beacon`] from a description map.
pub fn beacon_from_map(map: &Map<String, Value>) -> Result<Beacon> {
    let mut builder = Beacon::builder();

    if let Some(value) = map.get("identifiers") {
        let list = value
            .as_array()
            .ok_or_else(|| Error::InvalidParameter("\"identifiers\" must be a list".into()))?;
        if list.is_empty() {
            return Err(Error::InvalidParameter(
                "\"identifiers\" must not be empty".into(),
            ));
        }
        for entry in list {
            builder = builder.identifier(parse_identifier(entry)?);
        }
    } else {
        let uuid = required_str(map, "proximityUUID")?;
        let uuid = Uuid::parse_str(uuid).map_err(|_| {
            Error::InvalidParameter(format!("\"proximityUUID\" is not a UUID: \"{uuid}\""))
        })?;
        builder = builder.uuid(uuid);
        if let Some(major) = optional_u16(map, "major")? {
            builder = builder.major(major);
        }
        if let Some(minor) = optional_u16(map, "minor")? {
            builder = builder.minor(minor);
        }
    }

    if let Some(value) = map.get("txPower") {
        let power = value
            .as_i64()
            .and_then(|v| i8::try_from(v).ok())
            .ok_or_else(|| {
                Error::InvalidParameter("\"txPower\" must be a signed byte".into())
            })?;
        builder = builder.tx_power(power);
    }
    if let Some(company) = optional_u16(map, "manufacturerId")? {
        builder = builder.manufacturer(company);
    }
    if let Some(value) = map.get("serviceUuid") {
        let text = value
            .as_str()
            .ok_or_else(|| Error::InvalidParameter("\"serviceUuid\" must be a string".into()))?;
        let uuid = Uuid::parse_str(text).map_err(|_| {
            Error::InvalidParameter(format!("\"serviceUuid\" is not a UUID: \"{text}\""))
        })?;
        builder = builder.service_uuid(uuid);
    }
    if let Some(value) = map.get("localName") {
        let name = value
            .as_str()
            .ok_or_else(|| Error::InvalidParameter("\"localName\" must be a string".into()))?;
        builder = builder.local_name(name);
    }

    Ok(builder.build())
}

/// Build [`TransmitSettings`] from a settings map. Absent keys keep the
/// platform defaults; non-integer values are ignored the same way absent
/// ones are.
pub fn settings_from_map(map: &Map<String, Value>) -> Result<TransmitSettings> {
    let mut settings = TransmitSettings::default();

    if let Some(code) = map.get("advertisingMode").and_then(Value::as_i64) {
        let code = i32::try_from(code).unwrap_or(-1);
        settings.mode = Some(AdvertiseMode::from_i32(code).ok_or_else(|| {
            Error::InvalidParameter(format!("unknown advertising mode {code}"))
        })?);
    }
    if let Some(code) = map.get("advertisingTxPowerLevel").and_then(Value::as_i64) {
        let code = i32::try_from(code).unwrap_or(-1);
        settings.tx_power_level = Some(TxPowerLevel::from_i32(code).ok_or_else(|| {
            Error::InvalidParameter(format!("unknown tx power level {code}"))
        })?);
    }

    Ok(settings)
}

fn parse_identifier(value: &Value) -> Result<Identifier> {
    match value {
        Value::String(s) => {
            if let Some(hex) = s.strip_prefix("0x") {
                return decode_hex(hex)
                    .map(|bytes| Identifier::from_bytes(&bytes))
                    .ok_or_else(|| {
                        Error::InvalidParameter(format!("bad hex identifier \"{s}\""))
                    });
            }
            if let Ok(uuid) = Uuid::parse_str(s) {
                return Ok(Identifier::from_uuid(uuid));
            }
            s.parse::<u16>().map(Identifier::from_u16).map_err(|_| {
                Error::InvalidParameter(format!("identifier \"{s}\" is neither a UUID nor a number"))
            })
        }
        Value::Number(n) => n
            .as_u64()
            .and_then(|v| u16::try_from(v).ok())
            .map(Identifier::from_u16)
            .ok_or_else(|| {
                Error::InvalidParameter(format!("identifier {n} is out of the 16-bit range"))
            }),
        other => Err(Error::InvalidParameter(format!(
            "identifier {other} must be a string or a number"
        ))),
    }
}

fn required_str<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidParameter(format!("missing \"{key}\"")))
}

fn optional_u16(map: &Map<String, Value>, key: &str) -> Result<Option<u16>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|v| u16::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| {
                Error::InvalidParameter(format!("\"{key}\" must be a 16-bit unsigned integer"))
            }),
    }
}
