//! Fixed-point re-digitisation of stub coordinates for the GP-input and
//! HT-input phases.
//!
//! A scoped resource attached to each stub, maintaining three states —
//! uninitialised, GP-input-digitised, HT-input-digitised — with a cheap
//! in-place re-digitisation path when a stub must be re-expressed relative
//! to a different sector.

use crate::error::CoreError;
use trigger_common::config::DigitisedVariable;

/// Current digitisation lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigitisationState {
    Uninitialised,
    GpInput,
    HtInput,
}

/// One digitised variable: its integer encoding plus the floating-point
/// value reconstructed from those digits (resolution-degraded).
#[derive(Debug, Clone, Copy, Default)]
pub struct Digit {
    pub raw: i64,
    pub value: f64,
}

fn digitise(layout: &DigitisedVariable, value: f64, name: &str) -> Result<Digit, CoreError> {
    if value < layout.range_min || value > layout.range_max {
        return Err(CoreError::DigitisationRangeOverflow(format!(
            "{name}={value} outside declared range [{}, {}]",
            layout.range_min, layout.range_max
        )));
    }
    let span = layout.range_max - layout.range_min;
    let levels = (1u64 << layout.bits) as f64;
    let lsb = span / levels;
    let raw = ((value - layout.range_min) / lsb).floor() as i64;
    let reconstructed = layout.range_min + (raw as f64 + 0.5) * lsb;
    Ok(Digit {
        raw,
        value: reconstructed,
    })
}

/// Original, pre-digitisation stub data needed to re-derive every digit.
#[derive(Debug, Clone, Copy)]
pub struct DigitalStubInput {
    pub phi_orig: f64,
    pub r_orig: f64,
    pub z_orig: f64,
    pub dphi_orig: f64,
    pub rho_orig: f64,
    pub bend_orig: f64,
}

/// Digitisation layouts for the variables re-expressed per sector.
#[derive(Debug, Clone)]
pub struct DigitisationLayouts<'a> {
    pub phi_sector: &'a DigitisedVariable,
    pub phi_s: &'a DigitisedVariable,
    pub r_t: &'a DigitisedVariable,
    pub z: &'a DigitisedVariable,
    pub delta_phi: &'a DigitisedVariable,
    pub rho: &'a DigitisedVariable,
    pub phi_o: &'a DigitisedVariable,
    pub bend: &'a DigitisedVariable,
}

/// Per-stub digitisation scratch state. Re-digitising for a new sector is a
/// fast in-place overwrite; it never resets to `Uninitialised`.
#[derive(Debug, Clone)]
pub struct DigitalStub {
    state: DigitisationState,
    input: Option<DigitalStubInput>,

    current_sector: u32,

    digi_rt: Digit,
    digi_z: Digit,
    digi_phi_sector: u32,
    digi_phi_s: Digit,
    digi_dphi: Option<Digit>,
    digi_rho: Option<Digit>,
    digi_phi_o: Digit,
    digi_bend: Digit,
}

impl DigitalStub {
    pub fn new() -> Self {
        Self {
            state: DigitisationState::Uninitialised,
            input: None,
            current_sector: 0,
            digi_rt: Digit::default(),
            digi_z: Digit::default(),
            digi_phi_sector: 0,
            digi_phi_s: Digit::default(),
            digi_dphi: None,
            digi_rho: None,
            digi_phi_o: Digit::default(),
            digi_bend: Digit::default(),
        }
    }

    pub fn init(&mut self, input: DigitalStubInput) {
        self.input = Some(input);
    }

    pub fn state(&self) -> DigitisationState {
        self.state
    }

    /// Digitise for input to the Geographic Processor, with φ measured
    /// relative to the phi sector's centre.
    pub fn make_gp_input(
        &mut self,
        layouts: &DigitisationLayouts,
        phi_sector_centre: f64,
        i_phi_sec: u32,
    ) -> Result<(), CoreError> {
        let input = self.input.ok_or_else(|| {
            CoreError::InternalConsistencyViolation(
                "DigitalStub::make_gp_input called before init()".to_string(),
            )
        })?;
        self.digi_rt = digitise(layouts.r_t, input.r_orig, "r_t")?;
        self.digi_z = digitise(layouts.z, input.z_orig, "z")?;
        self.digi_phi_o = digitise(layouts.phi_o, input.phi_orig - phi_sector_centre, "phi_o")?;
        self.digi_bend = digitise(layouts.bend, input.bend_orig, "bend")?;
        self.current_sector = i_phi_sec;
        self.state = DigitisationState::GpInput;
        Ok(())
    }

    /// Digitise for input to the Hough Transform, with φ measured relative
    /// to the given sector. Always re-derives the GP-input digits too, so
    /// callers never need to call both separately.
    pub fn make_ht_input(
        &mut self,
        layouts: &DigitisationLayouts,
        phi_sector_centre: f64,
        i_phi_sec: u32,
        firmware_daisy_chain: bool,
    ) -> Result<(), CoreError> {
        self.make_gp_input(layouts, phi_sector_centre, i_phi_sec)?;
        let input = self.input.expect("just verified present by make_gp_input");
        self.digi_phi_sector = i_phi_sec;
        self.digi_phi_s = digitise(layouts.phi_s, input.phi_orig - phi_sector_centre, "phi_s")?;
        if firmware_daisy_chain {
            self.digi_dphi = None;
            self.digi_rho = None;
        } else {
            self.digi_dphi = Some(digitise(layouts.delta_phi, input.dphi_orig, "delta_phi")?);
            self.digi_rho = Some(digitise(layouts.rho, input.rho_orig, "rho")?);
        }
        self.state = DigitisationState::HtInput;
        Ok(())
    }

    /// Current φ-sector used for the last HT-input digitisation.
    pub fn current_sector(&self) -> u32 {
        self.current_sector
    }

    pub fn phi_s(&self) -> Result<f64, CoreError> {
        self.require_ht()?;
        Ok(self.digi_phi_s.value)
    }

    pub fn r_t(&self) -> Result<f64, CoreError> {
        self.require_gp()?;
        Ok(self.digi_rt.value)
    }

    pub fn z(&self) -> Result<f64, CoreError> {
        self.require_gp()?;
        Ok(self.digi_z.value)
    }

    /// Bend angle of the stub; unavailable under the daisy-chain firmware
    /// variant is an internal consistency violation.
    pub fn dphi(&self) -> Result<f64, CoreError> {
        self.require_ht()?;
        self.digi_dphi.map(|d| d.value).ok_or_else(|| {
            CoreError::InternalConsistencyViolation(
                "dphi is not available under the daisy-chain firmware variant".to_string(),
            )
        })
    }

    pub fn rho(&self) -> Result<f64, CoreError> {
        self.require_ht()?;
        self.digi_rho.map(|d| d.value).ok_or_else(|| {
            CoreError::InternalConsistencyViolation(
                "rho is not available under the daisy-chain firmware variant".to_string(),
            )
        })
    }

    fn require_gp(&self) -> Result<(), CoreError> {
        if self.state == DigitisationState::Uninitialised {
            return Err(CoreError::InternalConsistencyViolation(
                "DigitalStub accessed before makeGPinput()/makeHTinput()".to_string(),
            ));
        }
        Ok(())
    }

    fn require_ht(&self) -> Result<(), CoreError> {
        if self.state != DigitisationState::HtInput {
            return Err(CoreError::InternalConsistencyViolation(
                "DigitalStub HT-only field accessed before makeHTinput()".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DigitalStub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(bits: u8, min: f64, max: f64) -> DigitisedVariable {
        DigitisedVariable {
            bits,
            range_min: min,
            range_max: max,
        }
    }

    #[test]
    fn round_trip_stays_within_one_lsb() {
        let l = layout(14, -0.6, 0.6);
        let d = digitise(&l, 0.1234, "phi_s").unwrap();
        let lsb = 1.2 / (1u64 << 14) as f64;
        assert!((d.value - 0.1234).abs() <= lsb);
    }

    #[test]
    fn overflow_is_an_error() {
        let l = layout(14, -0.6, 0.6);
        assert!(digitise(&l, 5.0, "phi_s").is_err());
    }

    #[test]
    fn access_before_make_ht_input_is_rejected() {
        let mut stub = DigitalStub::new();
        stub.init(DigitalStubInput {
            phi_orig: 0.1,
            r_orig: 50.0,
            z_orig: 20.0,
            dphi_orig: 0.01,
            rho_orig: 0.001,
            bend_orig: 1.0,
        });
        assert!(stub.dphi().is_err());
        let layouts = DigitisationLayouts {
            phi_sector: &layout(14, -0.6, 0.6),
            phi_s: &layout(14, -0.6, 0.6),
            r_t: &layout(12, 0.0, 120.0),
            z: &layout(14, -120.0, 120.0),
            delta_phi: &layout(14, -0.1, 0.1),
            rho: &layout(10, 0.0, 0.1),
            phi_o: &layout(14, -0.6, 0.6),
            bend: &layout(8, -8.0, 8.0),
        };
        stub.make_ht_input(&layouts, 0.0, 3, false).unwrap();
        assert!(stub.dphi().is_ok());
        assert_eq!(stub.current_sector(), 3);
    }

    #[test]
    fn daisy_chain_variant_hides_dphi_and_rho() {
        let mut stub = DigitalStub::new();
        stub.init(DigitalStubInput {
            phi_orig: 0.1,
            r_orig: 50.0,
            z_orig: 20.0,
            dphi_orig: 0.01,
            rho_orig: 0.001,
            bend_orig: 1.0,
        });
        let layouts = DigitisationLayouts {
            phi_sector: &layout(14, -0.6, 0.6),
            phi_s: &layout(14, -0.6, 0.6),
            r_t: &layout(12, 0.0, 120.0),
            z: &layout(14, -120.0, 120.0),
            delta_phi: &layout(14, -0.1, 0.1),
            rho: &layout(10, 0.0, 0.1),
            phi_o: &layout(14, -0.6, 0.6),
            bend: &layout(8, -8.0, 8.0),
        };
        stub.make_ht_input(&layouts, 0.0, 0, true).unwrap();
        assert!(stub.dphi().is_err());
    }
}
