//! This is a platform-agnostic Rust driver for the MLX90632 infrared
//! temperature sensor based on the [`embedded-hal`] traits.
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal
//!
//! The sensor reports an ambient (die) temperature and a non-contact object
//! temperature. Both are derived from raw RAM channels using factory
//! calibration constants held in the sensor EEPROM, which this driver loads
//! during [`blocking::Mlx90632::initialize`].
//!
//! For further details of the device architecture and operation, please refer
//! to the official [`Datasheet`].
//!
//! [`Datasheet`]: https://www.melexis.com/en/documents/documentation/datasheets/datasheet-mlx90632

#![doc(html_root_url = "https://docs.rs/mlx90632/latest")]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

mod registers;
pub use registers::*;

pub mod backoff;
pub mod calculation;
pub mod calibration;

pub mod blocking;

/// ADDR pin logic level representation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    /// ADDR tied to GND (default).
    #[default]
    Low,
    /// ADDR tied to VDD.
    High,
}

impl From<Address> for u8 {
    fn from(address: Address) -> Self {
        match address {
            Address::Low => 0x3a,
            Address::High => 0x3b,
        }
    }
}

/// Emissivity of the measured surface.
///
/// Zero means "not set" and reads back as a perfect blackbody.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Emissivity(Option<f64>);

impl Emissivity {
    /// Emissivity used when none was set.
    pub const BLACKBODY: f64 = 1.0;

    /// Create an emissivity, `0.0` leaves it unset.
    pub fn new(value: f64) -> Self {
        if value == 0.0 {
            Self(None)
        } else {
            Self(Some(value))
        }
    }

    /// Emissivity to use in calculations.
    pub fn value(&self) -> f64 {
        self.0.unwrap_or(Self::BLACKBODY)
    }
}
