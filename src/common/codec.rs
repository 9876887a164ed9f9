//! Encoding and decoding of beacon identities against a [`BeaconLayout`].
//!
//! Layout offsets are counted from the start of the manufacturer section,
//! whose first two bytes are the company code. The company code travels
//! separately in [`AdvertisementPayload`], so every field lands in the data
//! block at `byte_start - 2`.

use log::trace;

use crate::api::{
    uuid_from_u16, uuid_to_u16, AdvertisementPayload, Beacon, BeaconLayout, FieldRole, FieldSpec,
    Identifier,
};
use crate::constants::{ADVERTISEMENT_OVERHEAD, COMPANY_CODE_LEN, MAX_ADVERTISEMENT_LEN};
use crate::{Error, Result};

/// Encode `beacon` into the manufacturer-specific advertisement payload
/// described by `layout`. Fails before writing anything; the output is never
/// truncated.
pub fn encode(layout: &BeaconLayout, beacon: &Beacon, company_code: u16) -> Result<AdvertisementPayload> {
    let expected = layout.identifier_count();
    let actual = beacon.identifiers().len();
    if actual < expected {
        return Err(Error::IdentifierCountMismatch { expected, actual });
    }

    let block_len = layout.manufacturer_data_len();
    let total = block_len + ADVERTISEMENT_OVERHEAD;
    if total > MAX_ADVERTISEMENT_LEN {
        return Err(Error::PayloadTooLarge {
            size: total,
            max: MAX_ADVERTISEMENT_LEN,
        });
    }

    let mut block = vec![0u8; block_len];
    for field in layout.fields() {
        match &field.role {
            FieldRole::MatchValue(expected) => {
                write_field(&mut block, field, expected)?;
            }
            FieldRole::Identifier(index) => {
                write_field(&mut block, field, beacon.identifiers()[*index].as_bytes())?;
            }
            FieldRole::Power => {
                block[field.byte_start - COMPANY_CODE_LEN] = beacon.tx_power() as u8;
            }
            FieldRole::Data(index) => {
                // Data values are optional; a missing one leaves zeroes.
                if let Some(value) = beacon.data_fields().get(*index) {
                    write_field(&mut block, field, value)?;
                }
            }
            FieldRole::ServiceUuid => {
                let uuid = beacon.service_uuid().ok_or_else(|| {
                    Error::InvalidParameter(
                        "layout declares a service UUID field but the beacon carries none".into(),
                    )
                })?;
                match field.width() {
                    2 => {
                        let short = uuid_to_u16(&uuid).ok_or_else(|| {
                            Error::InvalidParameter(format!(
                                "service UUID {uuid} has no 16-bit short form"
                            ))
                        })?;
                        write_field(&mut block, field, &short.to_be_bytes())?;
                    }
                    16 => write_field(&mut block, field, uuid.as_bytes())?,
                    len => {
                        return Err(Error::InvalidParameter(format!(
                            "service UUID field must span 2 or 16 bytes, not {len}"
                        )))
                    }
                }
            }
        }
    }

    trace!("encoded {} into {} payload bytes", beacon, total);
    Ok(AdvertisementPayload {
        company_code,
        manufacturer_data: block,
        service_uuid: beacon.service_uuid(),
    })
}

/// Recover a [`Beacon`] from a manufacturer-specific data block. Fails with
/// [`Error::LayoutMismatch`] when the block is too short or a match constant
/// differs, meaning the frame is not of this beacon type.
pub fn decode(layout: &BeaconLayout, bytes: &[u8]) -> Result<Beacon> {
    if bytes.len() < layout.manufacturer_data_len() {
        return Err(Error::LayoutMismatch);
    }

    let mut identifiers: Vec<Option<Identifier>> = vec![None; layout.identifier_count()];
    let mut data_fields: Vec<Option<Vec<u8>>> = vec![None; layout.data_count()];
    let mut builder = Beacon::builder();

    for field in layout.fields() {
        match &field.role {
            FieldRole::MatchValue(expected) => {
                if read_field(bytes, field) != *expected {
                    return Err(Error::LayoutMismatch);
                }
            }
            FieldRole::Identifier(index) => {
                identifiers[*index] = Some(Identifier::from_bytes(&read_field(bytes, field)));
            }
            FieldRole::Power => {
                builder = builder.tx_power(bytes[field.byte_start - COMPANY_CODE_LEN] as i8);
            }
            FieldRole::Data(index) => {
                data_fields[*index] = Some(read_field(bytes, field));
            }
            FieldRole::ServiceUuid => {
                let value = read_field(bytes, field);
                if let Ok(raw) = <[u8; 16]>::try_from(value.as_slice()) {
                    builder = builder.service_uuid(uuid::Uuid::from_bytes(raw));
                } else if let [hi, lo] = value.as_slice() {
                    builder = builder.service_uuid(uuid_from_u16(u16::from_be_bytes([*hi, *lo])));
                }
            }
        }
    }

    for identifier in identifiers.into_iter().flatten() {
        builder = builder.identifier(identifier);
    }
    for value in data_fields.into_iter().flatten() {
        builder = builder.data_field(value);
    }
    Ok(builder.build())
}

/// Copy `value` into the field's range. Big-endian values are right-aligned
/// and zero-padded at the front; little-endian values are stored reversed.
/// A value wider than the field is an error, never a truncation.
fn write_field(block: &mut [u8], field: &FieldSpec, value: &[u8]) -> Result<()> {
    let width = field.width();
    if value.len() > width {
        return Err(Error::InvalidParameter(format!(
            "value of {} bytes does not fit the {width} byte field at offset {}",
            value.len(),
            field.byte_start
        )));
    }

    let offset = field.byte_start - COMPANY_CODE_LEN;
    let dest = &mut block[offset..offset + width];
    if field.little_endian {
        for (slot, byte) in dest.iter_mut().zip(value.iter().rev()) {
            *slot = *byte;
        }
    } else {
        dest[width - value.len()..].copy_from_slice(value);
    }
    Ok(())
}

/// Read the field's range back out in canonical big-endian order.
fn read_field(bytes: &[u8], field: &FieldSpec) -> Vec<u8> {
    let offset = field.byte_start - COMPANY_CODE_LEN;
    let mut value = bytes[offset..offset + field.width()].to_vec();
    if field.little_endian {
        value.reverse();
    }
    value
}
