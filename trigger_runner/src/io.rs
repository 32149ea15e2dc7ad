//! JSON wire records for stub input and fitted-track output.
//!
//! [`crate::trigger_core::stub::Stub`] and `L1FittedTrack` deliberately carry
//! no `serde` derive — they are engine-internal arena types, not a wire
//! format. These records are the runner's boundary: plain, flat, and owned
//! only by this binary.

use serde::{Deserialize, Serialize};
use trigger_core::diagnostics::Diagnostics;
use trigger_core::stub::Stub;
use trigger_core::track::L1FittedTrack;

/// One stub as it arrives from an upstream event source.
#[derive(Debug, Clone, Deserialize)]
pub struct StubRecord {
    pub phi: f64,
    pub r: f64,
    pub z: f64,
    pub bend: f64,
    pub dphi_over_bend: f64,
    #[serde(default)]
    pub id_det: u32,
    pub r_err: f64,
    pub z_err: f64,
    pub layer_id: u16,
    pub barrel: bool,
    pub ps_module: bool,
    /// Truth-particle association indices, carried through unread by any
    /// in-scope algorithm.
    #[serde(default)]
    pub assoc_truth: Vec<u32>,
}

impl StubRecord {
    pub fn into_stub(self, index: u32) -> Stub {
        let mut stub = Stub::new(
            index,
            self.phi,
            self.r,
            self.z,
            self.bend,
            self.dphi_over_bend,
            self.id_det,
            self.r_err,
            self.z_err,
            self.layer_id,
            self.barrel,
            self.ps_module,
        );
        stub.assoc_truth = self.assoc_truth;
        stub
    }
}

/// One event: its stub collection, in arrival order.
#[derive(Debug, Clone, Deserialize)]
pub struct EventRecord {
    pub stubs: Vec<StubRecord>,
}

/// The full run: one B-field reading (constant for the whole run, as the
/// engine only re-derives it per event, not per stub) and the event list.
#[derive(Debug, Clone, Deserialize)]
pub struct RunInput {
    pub magnetic_field_tesla: f64,
    pub events: Vec<EventRecord>,
}

/// One fitted track, flattened for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct FittedTrackRecord {
    pub stubs: Vec<u32>,
    pub q_over_pt: f64,
    pub d0: f64,
    pub phi0: f64,
    pub z0: f64,
    pub tan_lambda: f64,
    pub chi_sq: f64,
    pub chi_sq_per_dof: f64,
    pub n_par: u8,
    pub i_phi_sec: u32,
    pub i_eta_reg: u32,
}

impl From<&L1FittedTrack> for FittedTrackRecord {
    fn from(t: &L1FittedTrack) -> Self {
        Self {
            stubs: t.stubs().to_vec(),
            q_over_pt: t.q_over_pt(),
            d0: t.d0(),
            phi0: t.phi0(),
            z0: t.z0(),
            tan_lambda: t.tan_lambda(),
            chi_sq: t.chi_sq(),
            chi_sq_per_dof: t.chi_sq_per_dof(),
            n_par: t.n_par(),
            i_phi_sec: t.i_phi_sec(),
            i_eta_reg: t.i_eta_reg(),
        }
    }
}

/// Monitoring counters flattened for serialization.
#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct DiagnosticsRecord {
    pub duplicate_stubs_removed: u64,
    pub rphi_errors_type_a: u64,
    pub rphi_errors_type_b: u64,
    pub rz_errors_type_a: u64,
    pub rz_errors_type_b: u64,
    pub max_line_gradient_rphi: f64,
    pub max_line_gradient_rz: f64,
    pub line_gradient_within_spec: bool,
}

impl From<&Diagnostics> for DiagnosticsRecord {
    fn from(d: &Diagnostics) -> Self {
        Self {
            duplicate_stubs_removed: d.duplicate_stubs_removed(),
            rphi_errors_type_a: d.rphi_counters().errors_type_a,
            rphi_errors_type_b: d.rphi_counters().errors_type_b,
            rz_errors_type_a: d.rz_counters().errors_type_a,
            rz_errors_type_b: d.rz_counters().errors_type_b,
            max_line_gradient_rphi: d.max_line_gradient_rphi(),
            max_line_gradient_rz: d.max_line_gradient_rz(),
            line_gradient_within_spec: d.line_gradient_within_spec(),
        }
    }
}

/// One event's worth of output.
#[derive(Debug, Clone, Serialize)]
pub struct EventOutput {
    pub tracks: Vec<FittedTrackRecord>,
    pub diagnostics: DiagnosticsRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_record_round_trips_into_a_stub() {
        let record = StubRecord {
            phi: 0.1,
            r: 50.0,
            z: 10.0,
            bend: 1.0,
            dphi_over_bend: 0.5,
            id_det: 7,
            r_err: 0.01,
            z_err: 0.02,
            layer_id: 3,
            barrel: true,
            ps_module: true,
            assoc_truth: vec![42],
        };
        let stub = record.into_stub(5);
        assert_eq!(stub.index(), 5);
        assert_eq!(stub.layer_id(), 3);
        assert_eq!(stub.assoc_truth, vec![42]);
    }

    #[test]
    fn run_input_parses_from_json() {
        let json = r#"{
            "magnetic_field_tesla": 3.8,
            "events": [
                { "stubs": [
                    {"phi": 0.0, "r": 22.0, "z": 5.0, "bend": 0.0, "dphi_over_bend": 1.0,
                     "r_err": 0.01, "z_err": 0.02, "layer_id": 1, "barrel": true, "ps_module": true}
                ] }
            ]
        }"#;
        let input: RunInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.events.len(), 1);
        assert_eq!(input.events[0].stubs.len(), 1);
    }
}
