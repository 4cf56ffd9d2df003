#![no_main]
use libfuzzer_sys::fuzz_target;
use rand::rngs::StdRng;
use rand::SeedableRng;
use trialsim::{rpwexp, rpwexp_enroll, RateTable};

fuzz_target!(|data: &[u8]| {
    if data.len() < 24 {
        return;
    }
    let seed = u64::from_le_bytes(data[0..8].try_into().unwrap());
    let n = ((data.len() - 8) / 16).min(16);
    let mut durations = Vec::with_capacity(n);
    let mut rates = Vec::with_capacity(n);

    for i in 0..n {
        let offset = 8 + i * 16;
        durations.push(f64::from_le_bytes(data[offset..offset + 8].try_into().unwrap()));
        rates.push(f64::from_le_bytes(data[offset + 8..offset + 16].try_into().unwrap()));
    }

    let Ok(table) = RateTable::from_durations(&durations, &rates) else {
        return;
    };
    let Ok(rate) = table.ungrouped("rate") else {
        return;
    };

    let mut rng = StdRng::seed_from_u64(seed);
    for t in rpwexp(50, &rate, &mut rng) {
        assert!(t >= 0.0 && !t.is_nan());
    }
    let arrivals = rpwexp_enroll(50, &rate, &mut rng);
    assert!(arrivals.windows(2).all(|w| !(w[1] < w[0])));
});
