use crate::error::KindError;
use std::fmt;

/// Metadata table numbers used by the bridge (`MonoMetaTableEnum`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MetadataTable {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    Field = 0x04,
    MethodDef = 0x06,
    Property = 0x17,
}

impl MetadataTable {
    pub const fn index(self) -> u32 {
        self as u32
    }
}

/// A metadata token: table number in the high byte, 1-based row below it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    pub const ROW_MASK: u32 = 0x00FF_FFFF;

    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Builds `(table << 24) | row`. Row 0 is the null row and is rejected.
    pub fn from_parts(table: MetadataTable, row: u32) -> Result<Self, KindError> {
        if row == 0 || row > Self::ROW_MASK {
            return Err(KindError::RowOutOfRange(row));
        }
        Ok(Token((table.index() << 24) | row))
    }

    pub fn type_def(row: u32) -> Result<Self, KindError> {
        Self::from_parts(MetadataTable::TypeDef, row)
    }

    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & Self::ROW_MASK
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
