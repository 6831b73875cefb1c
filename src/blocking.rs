//! Mlx90632 Blocking API

#[cfg(feature = "embedded-sensors-hal")]
use embedded_sensors_hal::sensor;
#[cfg(feature = "embedded-sensors-hal")]
use embedded_sensors_hal::temperature::{DegreesCelsius, TemperatureSensor};

use crate::backoff::Backoff;
use crate::calculation::{self, RawMeasurement};
use crate::calibration::{Calibration, Constant};
use crate::{
    Address, Control, EepromVersion, Emissivity, ErrorFlags, MeasurementSettings, PowerMode, RefreshRate, Register,
    Status, RESET_COMMAND,
};

/// Process-wide driver state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverStatus {
    /// Refresh rate read from EEPROM during initialization.
    pub refresh_rate: Option<RefreshRate>,

    /// Whether the sensor is known to be reachable and initialized.
    pub comm_established: bool,

    /// Poll wait and timeout bookkeeping.
    pub backoff: Backoff,
}

/// Last computed temperatures, in degrees Celsius.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Temperature {
    /// Ambient (die) temperature.
    pub ambient: f64,

    /// Object temperature.
    pub object: f64,
}

/// Outcome of one completed measurement cycle. Each channel fails
/// independently.
#[derive(Debug)]
pub struct Measurement<E: embedded_hal::i2c::Error> {
    /// Ambient temperature in degrees Celsius.
    pub ambient: Result<f64, Error<E>>,

    /// Object temperature in degrees Celsius.
    pub object: Result<f64, Error<E>>,
}

/// MLX90632 blocking device driver
pub struct Mlx90632<I2C: embedded_hal::i2c::I2c, DELAY: embedded_hal::delay::DelayNs> {
    /// The concrete I2C bus implementation
    i2c: I2C,

    /// The concrete [`embedded_hal::delay::DelayNs`] implementation
    delay: DELAY,

    /// The I2C address.
    pub(crate) addr: u8,

    /// Calibration constants, present once fully loaded.
    calibration: Option<Calibration>,

    /// Raw RAM channels of the latest cycle.
    raw: RawMeasurement,

    /// Temperatures of the latest successful computations.
    temperature: Temperature,

    state: DriverStatus,

    emissivity: Emissivity,

    error_flags: ErrorFlags,
}

impl<I2C: embedded_hal::i2c::I2c, DELAY: embedded_hal::delay::DelayNs> Mlx90632<I2C, DELAY> {
    const MAX_MEASUREMENT_TRIES: usize = 100;
    const POLL_JITTER_US: u32 = 100;
    const RESET_SETTLE_MIN_US: u32 = 150;
    const RESET_SETTLE_MAX_US: u32 = 200;

    /// Create a new MLX90632 instance. No bus traffic happens until
    /// [`Self::initialize`] or the first measurement.
    pub fn new_blocking(i2c: I2C, delay: DELAY, address: Address) -> Self {
        Self {
            i2c,
            delay,
            addr: address.into(),
            calibration: None,
            raw: RawMeasurement::default(),
            temperature: Temperature::default(),
            state: DriverStatus::default(),
            emissivity: Emissivity::default(),
            error_flags: ErrorFlags::default(),
        }
    }

    /// Create a new MLX90632 instance with ADDR tied to GND, resulting in an
    /// instance responding to address `0x3a`.
    pub fn new_blocking_with_addr_low(i2c: I2C, delay: DELAY) -> Self {
        Self::new_blocking(i2c, delay, Address::Low)
    }

    /// Create a new MLX90632 instance with ADDR tied to VDD, resulting in an
    /// instance responding to address `0x3b`.
    pub fn new_blocking_with_addr_high(i2c: I2C, delay: DELAY) -> Self {
        Self::new_blocking(i2c, delay, Address::High)
    }

    /// Destroy the driver instance, return the I2C bus instance.
    pub fn destroy(self) -> I2C {
        self.i2c
    }

    /// Check the sensor identity, load its calibration and leave it in
    /// sleeping step mode with no pending data.
    ///
    /// # Errors
    ///
    /// - `Error::Bus` when an I2C transaction fails
    /// - `Error::UnsupportedProtocol` when the DSP revision is not 5
    /// - `Error::AddressMismatch` when the EEPROM address does not match ours
    /// - `Error::UnsupportedRange` for the extended range variant
    pub fn initialize(&mut self) -> Result<(), Error<I2C::Error>> {
        let version = EepromVersion::from(self.read(Register::EepromVersion)?);
        if version.dsp_version() != EepromVersion::DSP_V5 {
            error!("unsupported DSP version {}", version.dsp_version());
            return Err(Error::UnsupportedProtocol(version.dsp_version()));
        }

        let expected = u16::from(self.addr >> 1);
        let found = self.read(Register::EepromI2cAddress)?;
        if found != expected {
            error!("expected device address {:x}, read {:x}", self.addr, found << 1);
            return Err(Error::AddressMismatch { expected, found });
        }

        let settings = MeasurementSettings::from(self.read(Register::EepromMeasurement1)?);
        self.state.refresh_rate = Some(settings.refresh_rate());
        info!("refresh rate {:?}", settings.refresh_rate());

        let calibration = self.load_calibration()?;
        self.calibration = Some(calibration);

        self.set_power_mode(PowerMode::SleepStep)?;
        self.clear_new_data()?;

        if version.is_extended_range() {
            error!("extended range sensor is not supported");
            return Err(Error::UnsupportedRange);
        }

        self.state.comm_established = true;
        info!("sensor initialized");
        Ok(())
    }

    /// Read all calibration constants from EEPROM.
    ///
    /// Waits for the EEPROM to become idle and switches to sleeping step mode
    /// first, EEPROM reads are unreliable otherwise.
    ///
    /// # Errors
    ///
    /// `Error::Bus` when an I2C transaction fails. Nothing is kept from a
    /// failed load.
    pub fn load_calibration(&mut self) -> Result<Calibration, Error<I2C::Error>> {
        while self.status()?.eeprom_busy() {
            core::hint::spin_loop();
        }
        self.set_power_mode(PowerMode::SleepStep)?;

        let mut calibration = Calibration::default();
        for constant in Constant::ALL {
            let low = self.read(Register::Eeprom(constant.address()))?;
            let high = if constant.is_wide() {
                self.read(Register::Eeprom(constant.address() + 1))?
            } else {
                0
            };

            let value = constant.decode(low, high);
            debug!("calibration {:?} = {}", constant, value);
            calibration.set(constant, value);
        }

        Ok(calibration)
    }

    /// Re-initialize the sensor if communication was lost.
    ///
    /// A failing status probe marks communication as down. While down, a
    /// successful probe triggers a full [`Self::initialize`].
    ///
    /// # Errors
    ///
    /// `Error::Bus` when the sensor cannot be reached, or any error of
    /// [`Self::initialize`].
    pub fn ensure_comm(&mut self) -> Result<(), Error<I2C::Error>> {
        if self.status().is_err() {
            self.state.comm_established = false;
        }

        if !self.state.comm_established {
            self.status()?;
            warn!("sensor (re)connected, initializing");
            self.initialize()?;
        }

        Ok(())
    }

    /// Trigger a single conversion and wait for its data.
    ///
    /// Returns the cycle position of the new data: `1` when it landed in
    /// RAM_4/RAM_5, `2` for RAM_7/RAM_8.
    ///
    /// # Errors
    ///
    /// - `Error::Timeout` when no data showed up within 100 status polls
    /// - `Error::Bus` when an I2C transaction fails
    /// - any error of [`Self::ensure_comm`]
    pub fn start_measurement(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.ensure_comm()?;
        self.start_conversion()?;
        self.clear_new_data()?;

        let wait_us = u32::from(self.state.backoff.wait_us());
        for _ in 0..Self::MAX_MEASUREMENT_TRIES {
            let status = self.status()?;
            if status.new_data() {
                return Ok(status.cycle_position().value());
            }

            self.sleep_us(wait_us, wait_us + Self::POLL_JITTER_US);
        }

        Err(Error::Timeout)
    }

    /// Run a full measurement cycle: trigger, wait, then compute both
    /// temperatures.
    ///
    /// When the cycle itself fails nothing is computed and the previous
    /// temperatures stay in place.
    ///
    /// # Errors
    ///
    /// Any error of [`Self::start_measurement`]. Channel errors are reported
    /// inside the returned [`Measurement`].
    pub fn measure(&mut self) -> Result<Measurement<I2C::Error>, Error<I2C::Error>> {
        let outcome = self.start_measurement();
        self.on_measurement_outcome(&outcome);
        let cycle_position = outcome?;

        let ambient = self.read_ambient();
        match ambient {
            Ok(t) => debug!("ambient temperature {}", t),
            Err(_) => warn!("reading ambient temperature failed"),
        }

        let object = self.read_object(cycle_position);
        match object {
            Ok(t) => debug!("object temperature {}", t),
            Err(_) => warn!("reading object temperature failed"),
        }

        Ok(Measurement { ambient, object })
    }

    /// Reset the sensor through its addressed reset command, then restore
    /// the control register.
    ///
    /// # Errors
    ///
    /// `Error::Bus` when an I2C transaction fails
    pub fn addressed_reset(&mut self) -> Result<(), Error<I2C::Error>> {
        let ctrl = self.control()?;

        self.set_control(ctrl.with_mode(PowerMode::Step))?;
        self.write(Register::Reset, RESET_COMMAND)?;
        self.sleep_us(Self::RESET_SETTLE_MIN_US, Self::RESET_SETTLE_MAX_US);

        self.set_control(ctrl)
    }

    /// Switch power mode, writing until the sensor reports the new mode.
    ///
    /// # Errors
    ///
    /// `Error::Bus` when an I2C transaction fails
    pub fn set_power_mode(&mut self, mode: PowerMode) -> Result<(), Error<I2C::Error>> {
        let mut ctrl = self.control()?;

        while ctrl.mode() != mode {
            self.set_control(ctrl.with_mode(mode))?;
            ctrl = self.control()?;
        }

        Ok(())
    }

    /// Read control register
    ///
    /// # Errors
    ///
    /// `Error::Bus` when the I2C transaction fails
    pub fn control(&mut self) -> Result<Control, Error<I2C::Error>> {
        Ok(Control::from(self.read(Register::Control)?))
    }

    /// Set control register
    ///
    /// # Errors
    ///
    /// `Error::Bus` when the I2C transaction fails
    pub fn set_control(&mut self, ctrl: Control) -> Result<(), Error<I2C::Error>> {
        self.write(Register::Control, ctrl.into())
    }

    /// Read status register
    ///
    /// # Errors
    ///
    /// `Error::Bus` when the I2C transaction fails
    pub fn status(&mut self) -> Result<Status, Error<I2C::Error>> {
        Ok(Status::from(self.read(Register::Status)?))
    }

    /// Set emissivity of the measured surface. `0.0` means unset, which is
    /// treated as a blackbody.
    pub fn set_emissivity(&mut self, value: f64) {
        self.emissivity = Emissivity::new(value);
    }

    /// Emissivity used for object temperatures.
    pub fn emissivity(&self) -> f64 {
        self.emissivity.value()
    }

    /// Temperatures of the latest successful computations. These are not
    /// cleared when a cycle fails.
    pub fn last_temperature(&self) -> Temperature {
        self.temperature
    }

    /// Last ambient temperature encoded as `(T + 40) * 10`.
    pub fn ambient_scaled(&self) -> u16 {
        Self::to_scaled(self.temperature.ambient)
    }

    /// Last object temperature encoded as `(T + 40) * 10`.
    pub fn object_scaled(&self) -> u16 {
        Self::to_scaled(self.temperature.object)
    }

    /// Sticky transport error flags, each cleared by the next successful
    /// transaction of the same kind.
    pub fn error_flags(&self) -> ErrorFlags {
        self.error_flags
    }

    /// Calibration constants, once loaded.
    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Refresh rate read during initialization.
    pub fn refresh_rate(&self) -> Option<RefreshRate> {
        self.state.refresh_rate
    }

    /// Driver bookkeeping: comm state, refresh rate and poll backoff.
    pub fn driver_status(&self) -> &DriverStatus {
        &self.state
    }

    fn on_measurement_outcome(&mut self, outcome: &Result<u8, Error<I2C::Error>>) {
        let timed_out = matches!(outcome, Err(Error::Timeout));
        let escalated = self.state.backoff.record(timed_out);
        if timed_out {
            warn!("measurement timed out, {} in a row", self.state.backoff.timeouts());
        }

        if escalated {
            warn!("poll wait now {} us, resetting sensor", self.state.backoff.wait_us());
            if self.addressed_reset().is_err() {
                warn!("sensor reset failed");
            }
        }
    }

    fn start_conversion(&mut self) -> Result<(), Error<I2C::Error>> {
        let mut ctrl = self.control()?;

        // The sensor ignores the write while busy.
        while !ctrl.soc() {
            self.set_control(ctrl.with_soc(true))?;
            ctrl = self.control()?;
        }

        Ok(())
    }

    fn clear_new_data(&mut self) -> Result<(), Error<I2C::Error>> {
        let status = self.status()?;
        self.write(Register::Status, status.with_new_data(false).into())
    }

    fn read_ambient(&mut self) -> Result<f64, Error<I2C::Error>> {
        let calibration = self.calibration.ok_or(Error::NotCalibrated)?;

        self.raw.ambient_ram_6 = self.read(Register::Ram(6))? as i16;
        self.raw.ambient_ram_9 = self.read(Register::Ram(9))? as i16;

        let t = calculation::ambient(&self.raw, &calibration);
        self.temperature.ambient = t;
        Ok(t)
    }

    fn read_object(&mut self, cycle_position: u8) -> Result<f64, Error<I2C::Error>> {
        let calibration = self.calibration.ok_or(Error::NotCalibrated)?;

        let (first, second) = match cycle_position {
            1 => (4, 5),
            2 => (7, 8),
            pos => return Err(Error::InvalidCyclePosition(pos)),
        };
        self.raw.object_ram_4_7 = self.read(Register::Ram(first))? as i16;
        self.raw.object_ram_5_8 = self.read(Register::Ram(second))? as i16;

        let t = calculation::object(&self.raw, &calibration, self.emissivity.value());
        self.temperature.object = t;
        Ok(t)
    }

    fn sleep_us(&mut self, min: u32, max: u32) {
        self.delay.delay_us((min + max) / 2);
    }

    fn read(&mut self, reg: Register) -> Result<u16, Error<I2C::Error>> {
        let mut bytes = [0; 2];
        let result = self
            .i2c
            .write_read(self.addr, &u16::from(reg).to_be_bytes(), &mut bytes);

        self.error_flags.set_read_failed(result.is_err());
        result.map_err(Error::Bus)?;
        Ok(u16::from_be_bytes(bytes))
    }

    fn write(&mut self, reg: Register, value: u16) -> Result<(), Error<I2C::Error>> {
        let mut data = [0; 4];

        data[..2].copy_from_slice(&u16::from(reg).to_be_bytes());
        data[2..].copy_from_slice(&value.to_be_bytes());

        let result = self.i2c.write(self.addr, &data);
        self.error_flags.set_write_failed(result.is_err());
        result.map_err(Error::Bus)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn to_scaled(t: f64) -> u16 {
        libm::round((t + 40.0) * 10.0) as u16
    }
}

/// Mlx90632 Errors
#[derive(Debug)]
pub enum Error<E: embedded_hal::i2c::Error> {
    /// I2C Bus Error
    Bus(E),

    /// The EEPROM reports a DSP revision this driver does not handle.
    UnsupportedProtocol(u8),

    /// The EEPROM holds another device address than the one we talk to.
    AddressMismatch {
        /// Expected EEPROM address word.
        expected: u16,
        /// EEPROM address word read back.
        found: u16,
    },

    /// Extended range sensor, its calculation is not implemented.
    UnsupportedRange,

    /// No new data within the poll budget.
    Timeout,

    /// Temperatures requested before calibration was loaded.
    NotCalibrated,

    /// The status register reported a cycle position other than 1 or 2.
    InvalidCyclePosition(u8),
}

#[cfg(feature = "embedded-sensors-hal")]
impl<E: embedded_hal::i2c::Error> sensor::Error for Error<E> {
    fn kind(&self) -> sensor::ErrorKind {
        sensor::ErrorKind::Other
    }
}

#[cfg(feature = "embedded-sensors-hal")]
impl<I2C: embedded_hal::i2c::I2c, DELAY: embedded_hal::delay::DelayNs> sensor::ErrorType for Mlx90632<I2C, DELAY> {
    type Error = Error<I2C::Error>;
}

#[cfg(feature = "embedded-sensors-hal")]
impl<I2C: embedded_hal::i2c::I2c, DELAY: embedded_hal::delay::DelayNs> TemperatureSensor for Mlx90632<I2C, DELAY> {
    /// Run a measurement cycle and report the object temperature.
    #[allow(clippy::cast_possible_truncation)]
    fn temperature(&mut self) -> Result<DegreesCelsius, Self::Error> {
        self.measure()?.object.map(|t| t as DegreesCelsius)
    }
}
