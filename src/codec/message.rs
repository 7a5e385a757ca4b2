use std::collections::BTreeMap;
use std::fmt;

use super::spec::field_name;
use crate::ids::mask_card_number;

/// Fields carrying the card number, masked in dumps.
const CARD_FIELDS: [u8; 2] = [2, 35];

/// Value carried by one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Binary(Vec<u8>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FieldValue::Text(text) => text.as_bytes(),
            FieldValue::Binary(bytes) => bytes,
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Binary(value)
    }
}

/// One protocol message: an MTI and the populated fields, keyed by number.
///
/// Field 1 is never stored: the secondary bitmap flag is derived at encode
/// time from the presence of fields 65 and above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    mti: String,
    fields: BTreeMap<u8, FieldValue>,
}

impl ProtocolMessage {
    pub fn new(mti: impl Into<String>) -> Self {
        Self {
            mti: mti.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn mti(&self) -> &str {
        &self.mti
    }

    pub fn set_mti(&mut self, mti: impl Into<String>) {
        self.mti = mti.into();
    }

    /// Set a field. Setting field 1 is rejected later by the encoder.
    pub fn set(&mut self, field: u8, value: impl Into<FieldValue>) -> &mut Self {
        self.fields.insert(field, value.into());
        self
    }

    pub fn get(&self, field: u8) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// Text value of a field, `None` when absent or binary.
    pub fn get_str(&self, field: u8) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }

    pub fn has(&self, field: u8) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn remove(&mut self, field: u8) -> Option<FieldValue> {
        self.fields.remove(&field)
    }

    /// Populated fields in ascending field-number order.
    pub fn fields(&self) -> impl Iterator<Item = (u8, &FieldValue)> + '_ {
        self.fields.iter().map(|(field, value)| (*field, value))
    }

    /// Whether encoding this message emits a secondary bitmap.
    pub fn has_secondary_bitmap(&self) -> bool {
        self.fields.keys().any(|field| *field >= 65)
    }
}

/// Multi-line dump with field names, for debug logging.
impl fmt::Display for ProtocolMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MTI {}", self.mti)?;
        for (field, value) in self.fields() {
            match value {
                FieldValue::Text(text) if CARD_FIELDS.contains(&field) => {
                    let masked = mask_card_number(text);
                    write!(f, "\n  {field:>3} ({}): {masked}", field_name(field))?;
                }
                FieldValue::Text(text) => {
                    write!(f, "\n  {field:>3} ({}): {text}", field_name(field))?;
                }
                FieldValue::Binary(bytes) => {
                    write!(f, "\n  {field:>3} ({}): [{}]", field_name(field), hex(bytes))?;
                }
            }
        }
        Ok(())
    }
}

/// Uppercase hex rendering of a byte slice.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_iterate_in_ascending_order() {
        let mut msg = ProtocolMessage::new("0200");
        msg.set(41, "TERM0001").set(3, "000000").set(102, "4000");
        let order: Vec<u8> = msg.fields().map(|(f, _)| f).collect();
        assert_eq!(order, vec![3, 41, 102]);
    }

    #[test]
    fn secondary_bitmap_follows_high_fields() {
        let mut msg = ProtocolMessage::new("0200");
        msg.set(64, vec![0u8; 8]);
        assert!(!msg.has_secondary_bitmap());
        msg.set(65, "x");
        assert!(msg.has_secondary_bitmap());
        msg.remove(65);
        assert!(!msg.has_secondary_bitmap());
    }

    #[test]
    fn get_str_ignores_binary() {
        let mut msg = ProtocolMessage::new("0200");
        msg.set(52, vec![1u8, 2]).set(39, "00");
        assert_eq!(msg.get_str(39), Some("00"));
        assert_eq!(msg.get_str(52), None);
        assert_eq!(msg.get(52).map(FieldValue::as_bytes), Some(&[1u8, 2][..]));
    }

    #[test]
    fn display_names_fields() {
        let mut msg = ProtocolMessage::new("0210");
        msg.set(39, "51").set(52, vec![0xABu8, 0x01]);
        let dump = msg.to_string();
        assert!(dump.starts_with("MTI 0210"));
        assert!(dump.contains("39 (Response Code): 51"));
        assert!(dump.contains("[AB01]"));
    }

    #[test]
    fn display_masks_card_fields() {
        let mut msg = ProtocolMessage::new("0200");
        msg.set(2, "4111111111111111");
        let dump = msg.to_string();
        assert!(dump.contains("411111******1111"));
        assert!(!dump.contains("4111111111111111"));
    }
}
