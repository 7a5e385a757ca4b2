//! Field specifications: how each field number is laid out on the wire.

use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Encoding class of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    /// Fixed-length digits, zero-left-padded.
    Numeric,
    /// Fixed-length text, space-right-padded.
    Alphanumeric,
    /// Variable-length text with a 2-digit decimal length prefix.
    LlVar,
    /// Variable-length text with a 3-digit decimal length prefix.
    LllVar,
    /// Fixed-length raw bytes.
    Binary,
}

/// Layout of one field: its class and its fixed (or maximum) length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub class: FieldClass,
    pub length: usize,
    /// Digits only (applies to variable fields as well, e.g. the PAN).
    pub numeric: bool,
}

impl FieldSpec {
    pub const fn numeric(length: usize) -> Self {
        Self {
            class: FieldClass::Numeric,
            length,
            numeric: true,
        }
    }

    pub const fn alpha(length: usize) -> Self {
        Self {
            class: FieldClass::Alphanumeric,
            length,
            numeric: false,
        }
    }

    pub const fn llvar(max: usize) -> Self {
        Self {
            class: FieldClass::LlVar,
            length: max,
            numeric: false,
        }
    }

    pub const fn llnum(max: usize) -> Self {
        Self {
            class: FieldClass::LlVar,
            length: max,
            numeric: true,
        }
    }

    pub const fn lllvar(max: usize) -> Self {
        Self {
            class: FieldClass::LllVar,
            length: max,
            numeric: false,
        }
    }

    pub const fn binary(length: usize) -> Self {
        Self {
            class: FieldClass::Binary,
            length,
            numeric: false,
        }
    }

    /// Width of the decimal length prefix, `None` for fixed fields.
    pub fn prefix_width(&self) -> Option<usize> {
        match self.class {
            FieldClass::LlVar => Some(2),
            FieldClass::LllVar => Some(3),
            FieldClass::Numeric | FieldClass::Alphanumeric | FieldClass::Binary => None,
        }
    }
}

/// Fields emitted or accepted by the gateway, with their names for logging.
const STANDARD_FIELDS: &[(u8, FieldSpec, &str)] = &[
    (2, FieldSpec::llnum(19), "PAN"),
    (3, FieldSpec::numeric(6), "Processing Code"),
    (4, FieldSpec::numeric(12), "Amount"),
    (7, FieldSpec::numeric(10), "Transmission Date/Time"),
    (11, FieldSpec::numeric(6), "STAN"),
    (12, FieldSpec::numeric(6), "Local Time"),
    (13, FieldSpec::numeric(4), "Local Date"),
    (14, FieldSpec::numeric(4), "Expiry Date"),
    (18, FieldSpec::numeric(4), "Merchant Category"),
    (22, FieldSpec::numeric(3), "POS Entry Mode"),
    (25, FieldSpec::numeric(2), "POS Condition"),
    (26, FieldSpec::numeric(2), "PIN Capture"),
    (32, FieldSpec::llnum(11), "Acquiring Institution"),
    (35, FieldSpec::llvar(37), "Track 2"),
    (37, FieldSpec::alpha(12), "RRN"),
    (38, FieldSpec::alpha(6), "Auth Code"),
    (39, FieldSpec::alpha(2), "Response Code"),
    (41, FieldSpec::alpha(8), "Terminal ID"),
    (42, FieldSpec::alpha(15), "Merchant ID"),
    (43, FieldSpec::alpha(40), "Merchant Name"),
    (49, FieldSpec::alpha(3), "Currency"),
    (52, FieldSpec::binary(8), "PIN Block"),
    (60, FieldSpec::lllvar(999), "Additional Data"),
    (62, FieldSpec::lllvar(999), "Transaction Data"),
    (90, FieldSpec::numeric(42), "Original Data Elements"),
    (102, FieldSpec::llvar(28), "From Account"),
    (103, FieldSpec::llvar(28), "To Account"),
    (128, FieldSpec::binary(8), "MAC"),
];

/// Lookup table from field number to [`FieldSpec`].
#[derive(Debug, Clone)]
pub struct FieldTable {
    specs: BTreeMap<u8, FieldSpec>,
}

impl FieldTable {
    /// A table with no fields registered.
    pub fn empty() -> Self {
        Self {
            specs: BTreeMap::new(),
        }
    }

    /// Register or replace the spec of one field.
    #[must_use]
    pub fn with_field(mut self, field: u8, spec: FieldSpec) -> Self {
        self.specs.insert(field, spec);
        self
    }

    pub fn get(&self, field: u8) -> Option<&FieldSpec> {
        self.specs.get(&field)
    }
}

impl Default for FieldTable {
    fn default() -> Self {
        Self {
            specs: STANDARD_FIELDS
                .iter()
                .map(|(field, spec, _)| (*field, *spec))
                .collect(),
        }
    }
}

static STANDARD_TABLE: LazyLock<FieldTable> = LazyLock::new(FieldTable::default);

/// Shared copy of the default table.
pub fn standard_fields() -> &'static FieldTable {
    &STANDARD_TABLE
}

/// Human-readable name of a field, used in message dumps.
pub fn field_name(field: u8) -> &'static str {
    STANDARD_FIELDS
        .iter()
        .find(|(number, _, _)| *number == field)
        .map_or("Field", |(_, _, name)| name)
}
