use std::fmt::{self, Debug, Display};
use thiserror::Error;

/// One of the three subfields packed into a ModRM byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Field {
    Mod,
    Reg,
    Rm,
}

impl Field {
    pub fn width(self) -> u32 {
        match self {
            Field::Mod => 2,
            Field::Reg | Field::Rm => 3,
        }
    }

    pub fn max(self) -> u8 {
        (1 << self.width()) - 1
    }

    fn check(self, value: u8) -> Result<u8, OutOfRange> {
        if value > self.max() {
            Err(OutOfRange { field: self, value })
        } else {
            Ok(value)
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Mod => "mod",
            Field::Reg => "reg",
            Field::Rm => "rm",
        })
    }
}

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[error("{field} out of range: {value} (max {})", .field.max())]
pub struct OutOfRange {
    pub field: Field,
    pub value: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModRm(pub u8);

impl ModRm {
    pub fn new(mod_: u8, reg: u8, rm: u8) -> Result<ModRm, OutOfRange> {
        let mod_ = Field::Mod.check(mod_)?;
        let reg = Field::Reg.check(reg)?;
        let rm = Field::Rm.check(rm)?;

        Ok(ModRm((mod_ << 6) | (reg << 3) | rm))
    }

    pub fn mod_(self) -> u8 {
        (self.0 >> 6) & 0b11
    }
    pub fn reg(self) -> u8 {
        (self.0 >> 3) & 0b111
    }
    pub fn rm(self) -> u8 {
        self.0 & 0b111
    }

    pub fn fields(self) -> (u8, u8, u8) {
        (self.mod_(), self.reg(), self.rm())
    }

    /// `mod == 0b11`: both operands are registers, no memory access.
    pub fn is_register_direct(self) -> bool {
        self.mod_() == 0b11
    }
}

impl From<u8> for ModRm {
    fn from(byte: u8) -> ModRm {
        ModRm(byte)
    }
}

impl From<ModRm> for u8 {
    fn from(modrm: ModRm) -> u8 {
        modrm.0
    }
}

impl Debug for ModRm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModRm")
            .field("mod", &self.mod_())
            .field("reg", &self.reg())
            .field("rm", &self.rm())
            .finish()
    }
}

impl Display for ModRm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Splits a ModRM byte into `(mod, reg, rm)`. Every byte is valid.
pub fn split(byte: u8) -> (u8, u8, u8) {
    ModRm(byte).fields()
}

/// Packs `(mod, reg, rm)` into a ModRM byte, rejecting any field wider
/// than its slot instead of masking it.
pub fn combine(mod_: u8, reg: u8, rm: u8) -> Result<u8, OutOfRange> {
    ModRm::new(mod_, reg, rm).map(u8::from)
}
