#![no_main]
use libfuzzer_sys::fuzz_target;
use ndarray::array;
use trialsim::MvnIntegration;

fuzz_target!(|data: &[u8]| {
    if data.len() < 24 {
        return;
    }
    let a = f64::from_le_bytes(data[0..8].try_into().unwrap());
    let b = f64::from_le_bytes(data[8..16].try_into().unwrap());
    let r = f64::from_le_bytes(data[16..24].try_into().unwrap());

    if a.is_nan() || b.is_nan() || r.is_nan() || !(-1.0..=1.0).contains(&r) {
        return;
    }

    let correlation = array![[1.0, r], [r, 1.0]];
    let integration = MvnIntegration {
        max_points: 2_000,
        ..MvnIntegration::default()
    };
    if let Ok(result) = integration.cdf(&[a, b], &correlation) {
        assert!((0.0..=1.0).contains(&result.value));
    }
});
