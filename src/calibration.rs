//! Factory calibration constants stored in the sensor EEPROM.
//!
//! Every constant is a fixed-point integer spanning one or two 16-bit EEPROM
//! words, scaled by a constant-specific power of two. Two-word constants keep
//! the low word at the lower address.

/// Calibration constants, one variant per EEPROM entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Constant {
    /// Ambient reference
    PR,
    /// Ambient gain
    PG,
    /// Ambient second order coefficient
    PT,
    /// Ambient offset
    PO,
    /// Die temperature slope
    Ea,
    /// Die temperature offset
    Eb,
    /// Object sensitivity
    Fa,
    /// Object sensitivity dependence on die temperature
    Fb,
    /// Object sensitivity dependence on object temperature
    Ga,
    /// Ambient channel beta
    Gb,
    /// Object channel beta
    Ka,
    /// Customer gain
    Ha,
    /// Customer offset
    Hb,
}

impl Constant {
    /// All constants, in EEPROM load order.
    pub const ALL: [Constant; 13] = [
        Constant::PR,
        Constant::PG,
        Constant::PT,
        Constant::PO,
        Constant::Ea,
        Constant::Eb,
        Constant::Fa,
        Constant::Fb,
        Constant::Ga,
        Constant::Gb,
        Constant::Ka,
        Constant::Ha,
        Constant::Hb,
    ];

    /// EEPROM address of the low word.
    pub const fn address(self) -> u16 {
        match self {
            Constant::PR => 0x240c,
            Constant::PG => 0x240e,
            Constant::PT => 0x2410,
            Constant::PO => 0x2412,
            Constant::Ea => 0x2424,
            Constant::Eb => 0x2426,
            Constant::Fa => 0x2428,
            Constant::Fb => 0x242a,
            Constant::Ga => 0x242c,
            Constant::Gb => 0x242e,
            Constant::Ka => 0x242f,
            Constant::Ha => 0x2481,
            Constant::Hb => 0x2482,
        }
    }

    /// Whether the constant spans two EEPROM words.
    pub const fn is_wide(self) -> bool {
        !matches!(self, Constant::Gb | Constant::Ka | Constant::Ha | Constant::Hb)
    }

    /// Power of two the raw integer is divided by.
    pub const fn shift(self) -> i32 {
        match self {
            Constant::PR | Constant::PO | Constant::Eb => 8,
            Constant::PG => 20,
            Constant::PT => 44,
            Constant::Ea => 16,
            Constant::Fa => 46,
            Constant::Fb | Constant::Ga => 36,
            Constant::Gb | Constant::Ka => 10,
            Constant::Ha | Constant::Hb => 14,
        }
    }

    /// Turn raw EEPROM words into the real-valued constant. `high` is ignored
    /// for single-word constants.
    ///
    /// Two-word constants are two's complement, single-word ones unsigned.
    pub fn decode(self, low: u16, high: u16) -> f64 {
        let raw = if self.is_wide() {
            f64::from(((u32::from(high) << 16) | u32::from(low)) as i32)
        } else {
            f64::from(low)
        };

        raw / libm::exp2(f64::from(self.shift()))
    }

    /// Inverse of [`Constant::decode`], rounding to the nearest representable
    /// value. Returns the `(low, high)` words; `high` is zero for single-word
    /// constants.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn encode(self, value: f64) -> (u16, u16) {
        let raw = libm::round(value * libm::exp2(f64::from(self.shift())));

        if self.is_wide() {
            let bits = raw as i32 as u32;
            (bits as u16, (bits >> 16) as u16)
        } else {
            (raw as u16, 0)
        }
    }
}

/// Decoded calibration set. Only ever built complete, by loading every
/// [`Constant`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[allow(non_snake_case)]
pub struct Calibration {
    pub P_R: f64,
    pub P_G: f64,
    pub P_T: f64,
    pub P_O: f64,
    pub Ea: f64,
    pub Eb: f64,
    pub Fa: f64,
    pub Fb: f64,
    pub Ga: f64,
    pub Gb: f64,
    pub Ka: f64,
    pub Ha: f64,
    pub Hb: f64,
}

impl Calibration {
    /// Store a decoded constant.
    pub fn set(&mut self, constant: Constant, value: f64) {
        *self.field_mut(constant) = value;
    }

    fn field_mut(&mut self, constant: Constant) -> &mut f64 {
        match constant {
            Constant::PR => &mut self.P_R,
            Constant::PG => &mut self.P_G,
            Constant::PT => &mut self.P_T,
            Constant::PO => &mut self.P_O,
            Constant::Ea => &mut self.Ea,
            Constant::Eb => &mut self.Eb,
            Constant::Fa => &mut self.Fa,
            Constant::Fb => &mut self.Fb,
            Constant::Ga => &mut self.Ga,
            Constant::Gb => &mut self.Gb,
            Constant::Ka => &mut self.Ka,
            Constant::Ha => &mut self.Ha,
            Constant::Hb => &mut self.Hb,
        }
    }
}
