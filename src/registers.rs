#![allow(missing_docs)]
use bilge::prelude::*;

/// Register addresses
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    /// Control register address.
    Control,

    /// Reset command register address.
    Reset,

    /// Status register address.
    Status,

    /// EEPROM version word.
    EepromVersion,

    /// EEPROM copy of the I2C address, stored shifted right by one.
    EepromI2cAddress,

    /// EEPROM settings for the first entry of the measurement table.
    EepromMeasurement1,

    /// Any other EEPROM word, by absolute address.
    Eeprom(u16),

    /// Measurement RAM channel, numbered from 1 as in the datasheet.
    Ram(u8),
}

impl Register {
    /// Start of the measurement RAM.
    pub const RAM_START: u16 = 0x4000;
}

impl From<Register> for u16 {
    fn from(reg: Register) -> Self {
        match reg {
            Register::Control => 0x3001,
            Register::Reset => 0x3005,
            Register::Status => 0x3fff,
            Register::EepromVersion => 0x240b,
            Register::EepromI2cAddress => 0x24d5,
            Register::EepromMeasurement1 => 0x24e1,
            Register::Eeprom(addr) => addr,
            Register::Ram(channel) => Register::RAM_START + u16::from(channel.saturating_sub(1)),
        }
    }
}

/// Command written to [`Register::Reset`] to reset the addressed device.
pub const RESET_COMMAND: u16 = 0x0006;

/// Control register.
#[bitsize(16)]
#[derive(DebugBits, FromBits, PartialEq, Clone, Copy)]
pub struct Control {
    reserved0: bool,

    /// Power mode
    pub mode: PowerMode,

    /// Start of conversion, only meaningful in step modes
    pub soc: bool,

    /// Measurement type select
    pub mtyp: u5,

    reserved9_10: u2,

    /// Start of burst, only meaningful in step modes
    pub sob: bool,

    reserved12_15: u4,
}

impl Control {
    /// Configure power mode.
    #[must_use]
    pub fn with_mode(mut self, mode: PowerMode) -> Self {
        self.set_mode(mode);
        self
    }

    /// Configure start of conversion.
    #[must_use]
    pub fn with_soc(mut self, soc: bool) -> Self {
        self.set_soc(soc);
        self
    }
}

/// Power mode.
#[bitsize(2)]
#[derive(Debug, FromBits, PartialEq, PartialOrd, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerMode {
    /// Halt, no measurements are taken.
    Halt,

    /// Sleeping step. The device sleeps between conversions and each one must
    /// be triggered with the SOC bit.
    SleepStep,

    /// Step. Like `SleepStep` but without sleeping between conversions.
    Step,

    /// Continuous, free-running conversions at the configured refresh rate.
    Continuous,
}

/// Status register.
#[bitsize(16)]
#[derive(DebugBits, FromBits, PartialEq, Clone, Copy)]
pub struct Status {
    /// New data available in RAM
    pub new_data: bool,

    reserved1: bool,

    /// Position of the latest data in the measurement table
    pub cycle_position: u5,

    reserved7: bool,

    /// Brown-out reset occurred
    pub brown_out: bool,

    /// EEPROM is busy
    pub eeprom_busy: bool,

    /// Device is busy
    pub device_busy: bool,

    reserved11_15: u5,
}

impl Status {
    /// Configure the new data flag.
    #[must_use]
    pub fn with_new_data(mut self, new_data: bool) -> Self {
        self.set_new_data(new_data);
        self
    }
}

/// EEPROM version word.
#[bitsize(16)]
#[derive(DebugBits, FromBits, PartialEq, Clone, Copy)]
pub struct EepromVersion {
    /// DSP revision
    pub dsp_version: u8,

    /// Device range key
    pub range_key: u7,

    reserved15: bool,
}

impl EepromVersion {
    /// DSP revision this driver supports.
    pub const DSP_V5: u8 = 0x05;

    /// Range key of the extended range variant.
    pub const EXTENDED_RANGE_KEY: u8 = 0x05;

    /// Whether the device is the extended range variant.
    pub fn is_extended_range(&self) -> bool {
        self.range_key().value() == Self::EXTENDED_RANGE_KEY
    }
}

/// EEPROM measurement settings word.
#[bitsize(16)]
#[derive(DebugBits, FromBits, PartialEq, Clone, Copy)]
pub struct MeasurementSettings {
    reserved0_7: u8,

    /// Refresh rate
    pub refresh_rate: RefreshRate,

    reserved11_15: u5,
}

/// Refresh rate.
#[bitsize(3)]
#[derive(Debug, FromBits, PartialEq, PartialOrd, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RefreshRate {
    /// 0.5Hz refresh rate.
    HertzHalf,

    /// 1Hz refresh rate.
    Hertz1,

    /// 2Hz refresh rate.
    Hertz2,

    /// 4Hz refresh rate.
    Hertz4,

    /// 8Hz refresh rate.
    Hertz8,

    /// 16Hz refresh rate.
    Hertz16,

    /// 32Hz refresh rate.
    Hertz32,

    /// 64Hz refresh rate.
    Hertz64,
}

impl RefreshRate {
    /// Nominal time between two measurements, in milliseconds.
    pub fn period_ms(&self) -> u32 {
        match self {
            RefreshRate::HertzHalf => 2000,
            RefreshRate::Hertz1 => 1000,
            RefreshRate::Hertz2 => 500,
            RefreshRate::Hertz4 => 250,
            RefreshRate::Hertz8 => 125,
            RefreshRate::Hertz16 => 63,
            RefreshRate::Hertz32 => 32,
            RefreshRate::Hertz64 => 16,
        }
    }
}

/// Sticky transport error flags.
#[bitsize(8)]
#[derive(DebugBits, FromBits, PartialEq, Clone, Copy)]
pub struct ErrorFlags {
    /// The last register read failed
    pub read_failed: bool,

    /// The last register write failed
    pub write_failed: bool,

    reserved2_7: u6,
}

impl Default for ErrorFlags {
    fn default() -> Self {
        Self::from(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_addresses() {
        assert_eq!(u16::from(Register::Control), 0x3001);
        assert_eq!(u16::from(Register::Status), 0x3fff);
        assert_eq!(u16::from(Register::Eeprom(0x240c)), 0x240c);
        assert_eq!(u16::from(Register::Ram(4)), 0x4003);
        assert_eq!(u16::from(Register::Ram(6)), 0x4005);
        assert_eq!(u16::from(Register::Ram(9)), 0x4008);
    }

    #[test]
    fn modify_power_mode() {
        let ctrl = Control::from(0x0000).with_mode(PowerMode::SleepStep);
        assert_eq!(ctrl.value, 0x0002);

        let ctrl = Control::from(0x0006).with_mode(PowerMode::Step);
        assert_eq!(ctrl.value, 0x0004);
        assert_eq!(ctrl.mode(), PowerMode::Step);
    }

    #[test]
    fn modify_start_of_conversion() {
        let ctrl = Control::from(0x0002).with_soc(true);
        assert_eq!(ctrl.value, 0x000a);
        assert!(ctrl.soc());
    }

    #[test]
    fn decode_measurement_type() {
        let ctrl = Control::from(0x0112);
        assert_eq!(ctrl.mtyp().value(), 0x11);
        assert_eq!(ctrl.mode(), PowerMode::SleepStep);
    }

    #[test]
    fn control_keeps_reserved_bits() {
        let ctrl = Control::from(0xf601).with_mode(PowerMode::Continuous);
        assert_eq!(ctrl.value, 0xf607);
        assert!(!ctrl.sob());
    }

    #[test]
    fn decode_status() {
        let sts = Status::from(0x0005);
        assert!(sts.new_data());
        assert_eq!(sts.cycle_position().value(), 1);

        let sts = Status::from(0x0009);
        assert_eq!(sts.cycle_position().value(), 2);

        let sts = Status::from(0x0700);
        assert!(sts.brown_out());
        assert!(sts.eeprom_busy());
        assert!(sts.device_busy());
        assert!(!sts.new_data());
    }

    #[test]
    fn clear_new_data() {
        let sts = Status::from(0x0109).with_new_data(false);
        assert_eq!(sts.value, 0x0108);
    }

    #[test]
    fn decode_eeprom_version() {
        let version = EepromVersion::from(0x0105);
        assert_eq!(version.dsp_version(), EepromVersion::DSP_V5);
        assert!(!version.is_extended_range());

        let version = EepromVersion::from(0x0505);
        assert!(version.is_extended_range());

        let version = EepromVersion::from(0x8505);
        assert!(version.is_extended_range());
    }

    #[test]
    fn decode_refresh_rate() {
        let settings = MeasurementSettings::from(0x820d);
        assert_eq!(settings.refresh_rate(), RefreshRate::Hertz2);
        assert_eq!(settings.refresh_rate().period_ms(), 500);

        let settings = MeasurementSettings::from(0x870d);
        assert_eq!(settings.refresh_rate(), RefreshRate::Hertz64);
    }

    #[test]
    fn error_flag_bits() {
        let mut flags = ErrorFlags::default();
        assert_eq!(flags.value, 0);

        flags.set_read_failed(true);
        assert_eq!(flags.value, 0b01);

        flags.set_write_failed(true);
        assert_eq!(flags.value, 0b11);

        flags.set_read_failed(false);
        assert_eq!(u8::from(flags), 0b10);
    }
}
