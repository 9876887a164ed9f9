//! Parsing of declarative beacon byte layouts.
//!
//! A layout string is a comma-separated list of field tokens, each of the
//! form `<role>:<start>-<end>[l][=<hex>]`. Roles are `i` (identifier), `p`
//! (calibrated power), `d` (data), `s` (service UUID) and `m` (match value,
//! which requires the `=<hex>` constant). Offsets are inclusive and counted
//! from the start of the manufacturer section, where bytes 0-1 hold the
//! 16-bit company code; the first usable offset is therefore 2. A trailing
//! `l` marks a little-endian field, everything else is big-endian.
//!
//! Token order only affects diagnostics; field placement is governed
//! entirely by the byte offsets.

use std::str::FromStr;

use crate::constants::COMPANY_CODE_LEN;
use crate::{Error, Result};

/// What a byte range within the manufacturer section carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRole {
    /// The n-th identifier value of the beacon, by appearance order.
    Identifier(usize),
    /// The calibrated power byte. Always one byte wide.
    Power,
    /// The n-th free-form data value, by appearance order.
    Data(usize),
    /// The beacon's service UUID.
    ServiceUuid,
    /// A constant that marks frames of this beacon type, checked on decode.
    MatchValue(Vec<u8>),
}

/// One parsed field: a role bound to an inclusive byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub role: FieldRole,
    pub byte_start: usize,
    pub byte_end: usize,
    pub little_endian: bool,
}

impl FieldSpec {
    /// Width of the field in bytes.
    pub fn width(&self) -> usize {
        self.byte_end - self.byte_start + 1
    }
}

/// An ordered, validated set of field descriptors. Immutable after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconLayout {
    fields: Vec<FieldSpec>,
    span: usize,
}

impl BeaconLayout {
    pub fn parse(layout: &str) -> Result<BeaconLayout> {
        layout.parse()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Number of identifier fields the layout declares.
    pub fn identifier_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| matches!(f.role, FieldRole::Identifier(_)))
            .count()
    }

    /// Number of data fields the layout declares.
    pub fn data_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| matches!(f.role, FieldRole::Data(_)))
            .count()
    }

    /// Total declared span in layout offsets, company code included.
    pub fn span(&self) -> usize {
        self.span
    }

    /// Length of the manufacturer-specific data block the layout implies,
    /// company code excluded.
    pub fn manufacturer_data_len(&self) -> usize {
        self.span - COMPANY_CODE_LEN
    }
}

impl FromStr for BeaconLayout {
    type Err = Error;

    fn from_str(s: &str) -> Result<BeaconLayout> {
        if s.is_empty() {
            return Err(Error::MalformedLayout("layout string is empty".into()));
        }

        let mut fields = Vec::new();
        let mut identifier_index = 0;
        let mut data_index = 0;
        for token in s.split(',') {
            let field = parse_token(token, &mut identifier_index, &mut data_index)?;
            fields.push(field);
        }

        if identifier_index == 0 {
            return Err(Error::MalformedLayout(
                "layout declares no identifier field".into(),
            ));
        }

        // Field placement is by offset, so overlaps are checked over the
        // ranges regardless of token order.
        let mut ranges: Vec<(usize, usize)> =
            fields.iter().map(|f| (f.byte_start, f.byte_end)).collect();
        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            if pair[1].0 <= pair[0].1 {
                return Err(Error::MalformedLayout(format!(
                    "field ranges {}-{} and {}-{} overlap",
                    pair[0].0, pair[0].1, pair[1].0, pair[1].1
                )));
            }
        }

        let span = fields.iter().map(|f| f.byte_end + 1).max().unwrap_or(0);
        Ok(BeaconLayout { fields, span })
    }
}

fn parse_token(
    token: &str,
    identifier_index: &mut usize,
    data_index: &mut usize,
) -> Result<FieldSpec> {
    let malformed = |reason: String| Error::MalformedLayout(format!("term \"{token}\": {reason}"));

    let (prefix, rest) = token
        .split_once(':')
        .ok_or_else(|| malformed("expected <role>:<start>-<end>".into()))?;

    let (range, expected) = match rest.split_once('=') {
        Some((range, hex)) => (range, Some(hex)),
        None => (rest, None),
    };

    let (range, little_endian) = match range.strip_suffix('l') {
        Some(stripped) => (stripped, true),
        None => (range, false),
    };

    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| malformed("missing byte range".into()))?;
    let byte_start: usize = start
        .parse()
        .map_err(|_| malformed(format!("bad start offset \"{start}\"")))?;
    let byte_end: usize = end
        .parse()
        .map_err(|_| malformed(format!("bad end offset \"{end}\"")))?;

    if byte_end < byte_start {
        return Err(malformed(format!(
            "end offset {byte_end} precedes start offset {byte_start}"
        )));
    }
    if byte_start < COMPANY_CODE_LEN {
        return Err(malformed(format!(
            "offsets below {COMPANY_CODE_LEN} fall inside the company code"
        )));
    }

    let len = byte_end - byte_start + 1;
    let role = match prefix {
        "i" => {
            let role = FieldRole::Identifier(*identifier_index);
            *identifier_index += 1;
            role
        }
        "p" => {
            if len != 1 {
                return Err(malformed("power field must be exactly one byte".into()));
            }
            FieldRole::Power
        }
        "d" => {
            let role = FieldRole::Data(*data_index);
            *data_index += 1;
            role
        }
        "s" => FieldRole::ServiceUuid,
        "m" => {
            let hex =
                expected.ok_or_else(|| malformed("match field requires =<hex> constant".into()))?;
            let bytes =
                decode_hex(hex).ok_or_else(|| malformed(format!("bad hex constant \"{hex}\"")))?;
            if bytes.len() != len {
                return Err(malformed(format!(
                    "constant is {} bytes but the field spans {len}",
                    bytes.len()
                )));
            }
            FieldRole::MatchValue(bytes)
        }
        other => return Err(malformed(format!("unknown field role \"{other}\""))),
    };

    if expected.is_some() && !matches!(role, FieldRole::MatchValue(_)) {
        return Err(malformed(
            "only match fields may carry an =<hex> constant".into(),
        ));
    }

    Ok(FieldSpec {
        role,
        byte_start,
        byte_end,
        little_endian,
    })
}

pub(crate) fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.is_empty() || s.len() % 2 != 0 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    s.as_bytes()
        .chunks_exact(2)
        .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).ok()?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::IBEACON_LAYOUT;

    #[test]
    fn parses_ibeacon_layout() {
        let layout = BeaconLayout::parse(IBEACON_LAYOUT).unwrap();
        assert_eq!(layout.identifier_count(), 3);
        assert_eq!(layout.span(), 25);
        assert_eq!(layout.manufacturer_data_len(), 23);
        assert_eq!(
            layout.fields()[0],
            FieldSpec {
                role: FieldRole::MatchValue(vec![0x02, 0x15]),
                byte_start: 2,
                byte_end: 3,
                little_endian: false,
            }
        );
        assert_eq!(layout.fields()[1].role, FieldRole::Identifier(0));
        assert_eq!(layout.fields()[4].role, FieldRole::Power);
    }

    #[test]
    fn parses_little_endian_and_data_fields() {
        let layout = BeaconLayout::parse("i:2-3l,d:4-5,p:6-6").unwrap();
        assert!(layout.fields()[0].little_endian);
        assert_eq!(layout.fields()[1].role, FieldRole::Data(0));
        assert_eq!(layout.data_count(), 1);
    }

    #[test]
    fn rejects_missing_identifier() {
        let err = BeaconLayout::parse("m:2-3=beac,p:4-4").unwrap_err();
        assert!(matches!(err, Error::MalformedLayout(_)));
    }

    #[test]
    fn rejects_overlapping_ranges() {
        let err = BeaconLayout::parse("i:2-5,p:5-5").unwrap_err();
        assert!(matches!(err, Error::MalformedLayout(_)));
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(BeaconLayout::parse("i:5-2").is_err());
    }

    #[test]
    fn rejects_offsets_inside_company_code() {
        assert!(BeaconLayout::parse("i:0-15").is_err());
    }

    #[test]
    fn rejects_bad_grammar() {
        assert!(BeaconLayout::parse("").is_err());
        assert!(BeaconLayout::parse("identifier").is_err());
        assert!(BeaconLayout::parse("q:2-3").is_err());
        assert!(BeaconLayout::parse("i:2").is_err());
        assert!(BeaconLayout::parse("i:a-b").is_err());
        assert!(BeaconLayout::parse("m:2-3").is_err());
        assert!(BeaconLayout::parse("m:2-3=xyzw").is_err());
        assert!(BeaconLayout::parse("m:2-3=02").is_err());
        assert!(BeaconLayout::parse("m:2-3=\u{20ac}a,i:4-5").is_err());
        assert!(BeaconLayout::parse("i:2-3=0215").is_err());
    }

    #[test]
    fn rejects_multibyte_chars_in_match_constant() {
        // Even byte length but not hex digits; must error, not panic.
        let err = BeaconLayout::parse("m:2-3=\u{20ac}a,i:4-19,p:20-20").unwrap_err();
        assert!(matches!(err, Error::MalformedLayout(_)));
    }

    #[test]
    fn rejects_wide_power_field() {
        assert!(BeaconLayout::parse("i:2-17,p:18-19").is_err());
    }

    #[test]
    fn token_order_does_not_move_fields() {
        let a = BeaconLayout::parse("p:6-6,i:2-5").unwrap();
        let b = BeaconLayout::parse("i:2-5,p:6-6").unwrap();
        assert_eq!(a.span(), b.span());
        let find = |layout: &BeaconLayout, role: FieldRole| {
            layout
                .fields()
                .iter()
                .find(|f| f.role == role)
                .map(|f| (f.byte_start, f.byte_end))
        };
        assert_eq!(find(&a, FieldRole::Power), find(&b, FieldRole::Power));
        assert_eq!(
            find(&a, FieldRole::Identifier(0)),
            find(&b, FieldRole::Identifier(0))
        );
    }
}
