//! De-embedding: raw sweep minus grating-coupler reference, plus port
//! classification.
//!
//! The reference is subtracted in dB, sample by sample, so both sweeps must
//! sit on the same wavelength grid. "Same grid" means equal length and end
//! points that agree to within half a sample step; anything else is a
//! `GridMismatch` for that sweep.

use crate::domain::{
    Device, MainSweep, Measurement, Orientation, PortType, RawSweep, ReferenceKey,
    ReferenceSweep, Spectrum, SweepKey,
};
use crate::error::SweepError;

/// Drop/thru classification of an output port.
///
/// | orientation | output | port |
/// |---|---|---|
/// | V | 3 | drop |
/// | H | 2 | drop |
/// | V | 2 | thru |
/// | H | 3 | thru |
pub fn classify_port(key: SweepKey, orientation: Orientation, output: u8) -> Result<PortType, SweepError> {
    match (orientation, output) {
        (Orientation::Vertical, 3) | (Orientation::Horizontal, 2) => Ok(PortType::Drop),
        (Orientation::Vertical, 2) | (Orientation::Horizontal, 3) => Ok(PortType::Thru),
        _ => Err(SweepError::UnrecognizedPortType {
            key,
            orientation: orientation.code().to_string(),
            output,
        }),
    }
}

/// Address of the reference a raw sweep is de-embedded against.
pub fn reference_key(measurement: &Measurement, device: &Device, raw: &RawSweep) -> ReferenceKey {
    ReferenceKey {
        wafer_id: measurement.wafer_id.clone(),
        die_id: measurement.die_id.clone(),
        doe_column: device.doe_column,
        input: raw.input,
        output: raw.output,
    }
}

/// Reject a reference that does not share the raw sweep's grid.
pub fn check_grid(key: SweepKey, raw: &Spectrum, reference: &Spectrum) -> Result<(), SweepError> {
    let tolerance = raw.mean_step_nm() / 2.0;
    let same_grid = raw.len() == reference.len()
        && (raw.start_nm() - reference.start_nm()).abs() <= tolerance
        && (raw.end_nm() - reference.end_nm()).abs() <= tolerance;
    if same_grid {
        return Ok(());
    }
    Err(SweepError::GridMismatch {
        key,
        raw_len: raw.len(),
        raw_start: raw.start_nm(),
        raw_end: raw.end_nm(),
        reference_len: reference.len(),
        reference_start: reference.start_nm(),
        reference_end: reference.end_nm(),
    })
}

/// Build the main sweep for `raw`.
///
/// The result keeps the raw wavelength axis and bias, and records the
/// canonical id of `reference`.
pub fn deembed(raw: &RawSweep, reference: &ReferenceSweep, device: &Device) -> Result<MainSweep, SweepError> {
    let port_type = classify_port(raw.key, device.orientation, raw.output)?;
    check_grid(raw.key, &raw.spectrum, &reference.spectrum)?;

    let transmission_db: Vec<f64> = raw
        .spectrum
        .transmission_db()
        .iter()
        .zip(reference.spectrum.transmission_db())
        .map(|(r, c)| r - c)
        .collect();
    let spectrum = Spectrum::new(raw.spectrum.wavelength_nm().to_vec(), transmission_db)
        .map_err(|source| SweepError::InvalidSpectrum { key: raw.key, source })?;

    Ok(MainSweep {
        key: raw.key,
        reference_id: reference.key.to_string(),
        port_type,
        voltage_v: raw.voltage_v,
        current_ma: raw.current_ma,
        spectrum,
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn device(orientation: Orientation) -> Device {
        Device {
            device_id: "WDM_RR_V_C7".to_string(),
            orientation,
            bend_type: "euler".to_string(),
            coupler_length_um: 1.5,
            doe_row: 2,
            doe_column: 7,
        }
    }

    fn raw(output: u8, wavelength: Vec<f64>, db: Vec<f64>) -> RawSweep {
        RawSweep {
            key: SweepKey::new(11, 2),
            input: 1,
            output,
            voltage_v: Some(0.5),
            current_ma: None,
            spectrum: Spectrum::new(wavelength, db).unwrap(),
        }
    }

    fn reference(wavelength: Vec<f64>, db: Vec<f64>) -> ReferenceSweep {
        ReferenceSweep {
            key: ReferenceKey {
                wafer_id: "R2P0E380PLC5".to_string(),
                die_id: "3_4".to_string(),
                doe_column: 7,
                input: 1,
                output: 3,
            },
            temperature_c: None,
            fiber_height_um: None,
            spectrum: Spectrum::new(wavelength, db).unwrap(),
        }
    }

    #[test]
    fn classification_table() {
        let key = SweepKey::new(1, 0);
        assert_eq!(classify_port(key, Orientation::Vertical, 3), Ok(PortType::Drop));
        assert_eq!(classify_port(key, Orientation::Horizontal, 2), Ok(PortType::Drop));
        assert_eq!(classify_port(key, Orientation::Vertical, 2), Ok(PortType::Thru));
        assert_eq!(classify_port(key, Orientation::Horizontal, 3), Ok(PortType::Thru));
    }

    #[test]
    fn unknown_output_port_names_the_sweep() {
        let key = SweepKey::new(5, 9);
        let err = classify_port(key, Orientation::Vertical, 5).unwrap_err();
        assert_eq!(err.kind(), "unrecognized_port_type");
        assert_eq!(err.key(), key);
        assert!(err.to_string().contains("measurement_id=5 sweep_id=9"));
    }

    #[test]
    fn subtracts_reference_in_db() {
        let wl = vec![1550.0, 1550.1, 1550.2];
        let raw = raw(3, wl.clone(), vec![-10.0, -4.0, -9.0]);
        let reference = reference(wl.clone(), vec![-6.0, -6.5, -7.0]);

        let main = deembed(&raw, &reference, &device(Orientation::Vertical)).unwrap();
        assert_eq!(main.port_type, PortType::Drop);
        assert_eq!(main.spectrum.wavelength_nm(), wl.as_slice());
        assert_eq!(main.spectrum.transmission_db(), &[-4.0, 2.5, -2.0]);
        assert_eq!(main.reference_id, "R2P0E380PLC5_3_4_WDM_RR_GCDE_C1_C3_7");
        assert_eq!(main.voltage_v, Some(0.5));
    }

    #[test]
    fn length_mismatch_is_grid_mismatch() {
        let raw = raw(3, vec![1550.0, 1550.1, 1550.2], vec![0.0; 3]);
        let reference = reference(vec![1550.0, 1550.1], vec![0.0; 2]);
        let err = deembed(&raw, &reference, &device(Orientation::Vertical)).unwrap_err();
        assert!(matches!(
            err,
            SweepError::GridMismatch {
                raw_len: 3,
                reference_len: 2,
                ..
            }
        ));
    }

    #[test]
    fn shifted_domain_is_grid_mismatch() {
        let raw = raw(3, vec![1550.0, 1550.1, 1550.2], vec![0.0; 3]);
        let reference = reference(vec![1551.0, 1551.1, 1551.2], vec![0.0; 3]);
        let err = deembed(&raw, &reference, &device(Orientation::Vertical)).unwrap_err();
        assert_eq!(err.kind(), "grid_mismatch");

        // Sub-step jitter in the end points is the same grid.
        let close = reference_with(vec![1550.01, 1550.1, 1550.21]);
        assert!(check_grid(raw.key, &raw.spectrum, &close.spectrum).is_ok());
    }

    fn reference_with(wavelength: Vec<f64>) -> ReferenceSweep {
        let n = wavelength.len();
        reference(wavelength, vec![0.0; n])
    }

    #[test]
    fn port_is_checked_before_grid() {
        let raw = raw(4, vec![1550.0, 1550.1], vec![0.0; 2]);
        let reference = reference(vec![1550.0], vec![0.0]);
        let err = deembed(&raw, &reference, &device(Orientation::Horizontal)).unwrap_err();
        assert_eq!(err.kind(), "unrecognized_port_type");
    }

    #[test]
    fn reference_key_combines_measurement_device_and_ports() {
        let measurement = Measurement {
            measurement_id: 11,
            wafer_id: "R2P0E380PLC5".to_string(),
            die_id: "3_4".to_string(),
            device_id: Some("WDM_RR_V_C7".to_string()),
        };
        let raw = raw(3, vec![1550.0], vec![0.0]);
        let key = reference_key(&measurement, &device(Orientation::Vertical), &raw);
        assert_eq!(key, reference(vec![1550.0], vec![0.0]).key);
    }

    proptest! {
        #[test]
        fn main_sweep_is_elementwise_difference(
            pairs in prop::collection::vec((-60.0f64..10.0, -20.0f64..0.0), 1..64)
        ) {
            let wl: Vec<f64> = (0..pairs.len()).map(|i| 1550.0 + i as f64 * 0.01).collect();
            let raw_db: Vec<f64> = pairs.iter().map(|p| p.0).collect();
            let ref_db: Vec<f64> = pairs.iter().map(|p| p.1).collect();
            let raw = raw(2, wl.clone(), raw_db.clone());
            let reference = reference(wl, ref_db.clone());

            let main = deembed(&raw, &reference, &device(Orientation::Horizontal)).unwrap();
            prop_assert_eq!(main.spectrum.len(), raw.spectrum.len());
            for i in 0..raw_db.len() {
                prop_assert_eq!(main.spectrum.transmission_db()[i], raw_db[i] - ref_db[i]);
            }
        }
    }
}
