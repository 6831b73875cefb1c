//! Ambient and object temperature calculation.
//!
//! Pure functions over raw RAM channels and decoded [`Calibration`]
//! constants. Everything is computed in `f64`.

use crate::calibration::Calibration;

/// ResCtrlRef of the measurement channels.
pub const REF: f64 = 12.0;

/// Number of refinement rounds of the object temperature equation.
pub const OBJECT_ITERATIONS: usize = 3;

const KELVIN: f64 = 273.15;
const T_REF: f64 = 25.0;
const FULL_SCALE: f64 = 524_288.0; // 2^19

/// Raw RAM channels of one measurement cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawMeasurement {
    /// RAM_6
    pub ambient_ram_6: i16,
    /// RAM_9
    pub ambient_ram_9: i16,
    /// RAM_4 or RAM_7, depending on the cycle position
    pub object_ram_4_7: i16,
    /// RAM_5 or RAM_8, depending on the cycle position
    pub object_ram_5_8: i16,
}

impl RawMeasurement {
    /// Normalized ambient signal, with the ambient channel beta `gb`.
    #[allow(non_snake_case)]
    fn amb(&self, gb: f64) -> f64 {
        let ram_6 = f64::from(self.ambient_ram_6) / REF;
        let VR_Ta = f64::from(self.ambient_ram_9) + gb * ram_6;
        ram_6 / VR_Ta * FULL_SCALE
    }

    /// Normalized object signal, with the object channel beta `ka`.
    #[allow(non_snake_case)]
    fn sto(&self, ka: f64) -> f64 {
        let s = (f64::from(self.object_ram_4_7) + f64::from(self.object_ram_5_8)) / 2.0;
        let VR_to = f64::from(self.ambient_ram_9) + ka * (f64::from(self.ambient_ram_6) / REF);
        (s / REF) / VR_to * FULL_SCALE
    }
}

/// Ambient (die) temperature in degrees Celsius.
pub fn ambient(raw: &RawMeasurement, calib: &Calibration) -> f64 {
    let amb = raw.amb(calib.Gb) - calib.P_R;
    calib.P_O + amb / calib.P_G + calib.P_T * (amb * amb)
}

/// Object temperature in degrees Celsius, corrected for `emissivity`.
#[allow(non_snake_case)]
pub fn object(raw: &RawMeasurement, calib: &Calibration, emissivity: f64) -> f64 {
    let Sto = raw.sto(calib.Ka);
    let TAdut = (raw.amb(calib.Gb) - calib.Eb) / calib.Ea + T_REF;
    let TAk = TAdut + KELVIN;
    let TAk4 = TAk * TAk * TAk * TAk;

    object_iteration(Sto, TAdut, TAk4, calib, emissivity)
}

/// Solve the object equation with a fixed number of substitution rounds,
/// starting from 25 °C.
#[allow(non_snake_case)]
pub fn object_iteration(Sto: f64, TAdut: f64, TAk4: f64, calib: &Calibration, emissivity: f64) -> f64 {
    let mut TOdut = T_REF;

    for _ in 0..OBJECT_ITERATIONS {
        let sensitivity =
            emissivity * calib.Fa * calib.Ha * (1.0 + calib.Ga * (TOdut - T_REF) + calib.Fb * (TAdut - T_REF));
        TOdut = libm::sqrt(libm::sqrt(Sto / sensitivity + TAk4)) - KELVIN - calib.Hb;
    }

    TOdut
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;
    use crate::calibration::Constant;

    /// Constants decoded from a real device EEPROM dump.
    fn device_calibration() -> Calibration {
        let mut calib = Calibration::default();
        let words: [(Constant, u16, u16); 13] = [
            (Constant::PR, 0x7f5b, 0x0058),
            (Constant::PG, 0x0289, 0x04a1),
            (Constant::PT, 0x66f8, 0xfff9),
            (Constant::PO, 0x1e0f, 0x0000),
            (Constant::Ea, 0x268f, 0x004a),
            (Constant::Eb, 0xc4ec, 0x0056),
            (Constant::Fa, 0xc481, 0x0335),
            (Constant::Fb, 0x3525, 0x028e),
            (Constant::Ga, 0xe306, 0xff21),
            (Constant::Gb, 0x2600, 0),
            (Constant::Ka, 0x2a00, 0),
            (Constant::Ha, 0x4000, 0),
            (Constant::Hb, 0x0000, 0),
        ];
        for (constant, low, high) in words {
            calib.set(constant, constant.decode(low, high));
        }
        calib
    }

    fn bench_raw(object: i16) -> RawMeasurement {
        RawMeasurement {
            ambient_ram_6: 20000,
            ambient_ram_9: 23000,
            object_ram_4_7: object,
            object_ram_5_8: object,
        }
    }

    #[test]
    fn ambient_closed_form() {
        let raw = RawMeasurement {
            ambient_ram_6: 13000,
            ambient_ram_9: 15000,
            ..Default::default()
        };
        let calib = Calibration {
            Gb: 0.5,
            P_O: 0.0,
            P_R: 0.0,
            P_G: 1.0,
            P_T: 0.0,
            ..Default::default()
        };

        // (13000 / 12) / (15000 + 0.5 * 13000 / 12) * 2^19
        assert_approx_eq!(ambient(&raw, &calib), 36_545.544_2, 1e-4);
    }

    #[test]
    fn ambient_with_device_calibration() {
        let calib = device_calibration();
        assert_approx_eq!(ambient(&bench_raw(0), &calib), 27.982_424, 1e-4);
    }

    #[test]
    fn object_with_device_calibration() {
        let calib = device_calibration();
        assert_approx_eq!(object(&bench_raw(400), &calib, 1.0), 33.881_195, 1e-4);
        assert_approx_eq!(object(&bench_raw(800), &calib, 1.0), 38.646_362, 1e-4);
    }

    #[test]
    fn object_without_signal_is_die_temperature() {
        let calib = device_calibration();
        let raw = bench_raw(0);
        let die = (raw.amb(calib.Gb) - calib.Eb) / calib.Ea + 25.0;

        assert_approx_eq!(object(&raw, &calib, 1.0), die, 1e-9);
    }

    #[test]
    fn lower_emissivity_raises_object_temperature() {
        let calib = device_calibration();
        let blackbody = object(&bench_raw(400), &calib, 1.0);
        let grey = object(&bench_raw(400), &calib, 0.95);

        assert!(grey > blackbody);
        assert_approx_eq!(grey, 34.137_333, 1e-4);
    }

    #[test]
    fn object_solve_runs_three_rounds() {
        let calib = device_calibration();
        let raw = bench_raw(800);
        let sto = raw.sto(calib.Ka);
        let die = (raw.amb(calib.Gb) - calib.Eb) / calib.Ea + 25.0;
        let tak = die + 273.15;
        let tak4 = tak * tak * tak * tak;

        let round = |t: f64| {
            let sensitivity = calib.Fa * calib.Ha * (1.0 + calib.Ga * (t - 25.0) + calib.Fb * (die - 25.0));
            libm::sqrt(libm::sqrt(sto / sensitivity + tak4)) - 273.15 - calib.Hb
        };
        let two = round(round(25.0));
        let three = round(two);
        let four = round(three);

        let solved = object_iteration(sto, die, tak4, &calib, 1.0);
        assert_approx_eq!(solved, three, 1e-12);
        assert_approx_eq!(object(&raw, &calib, 1.0), three, 1e-12);

        // neighbouring round counts land measurably elsewhere
        assert!((solved - two).abs() > 1e-6);
        assert!((solved - four).abs() > 1e-9);
    }

    #[test]
    fn object_is_deterministic() {
        let calib = device_calibration();
        let raw = bench_raw(200);

        let first = object(&raw, &calib, 1.0);
        for _ in 0..10 {
            assert_eq!(object(&raw, &calib, 1.0), first);
        }
        assert_approx_eq!(first, 31.416_700, 1e-4);
    }
}
