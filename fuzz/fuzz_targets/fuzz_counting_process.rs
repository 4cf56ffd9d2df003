#![no_main]
use libfuzzer_sys::fuzz_target;
use trialsim::{counting_process, weighted_logrank, CutObservation, WeightFunction};

fuzz_target!(|data: &[u8]| {
    if data.len() < 10 {
        return;
    }
    let n = (data.len() / 10).min(1000);
    let mut observations = Vec::with_capacity(n);

    for i in 0..n {
        let offset = i * 10;
        let tte = f64::from_le_bytes(data[offset..offset + 8].try_into().unwrap());
        let flags = data[offset + 8];
        let stratum = data[offset + 9] % 3;

        if tte.is_nan() || tte.is_infinite() || tte < 0.0 {
            return;
        }

        observations.push(CutObservation {
            id: i + 1,
            stratum: format!("s{stratum}"),
            treatment: if flags & 1 == 1 { "experimental" } else { "control" }.to_string(),
            enroll_time: 0.0,
            exit_time: tte,
            tte,
            event: flags & 2 == 2,
        });
    }

    if let Ok(table) = counting_process(&observations, "experimental") {
        for row in &table.rows {
            assert!(row.n_risk_treatment > 0.0 && row.n_risk_treatment < row.n_risk);
            assert!(row.var_o_minus_e >= 0.0);
            assert!(row.s >= 0.0 && row.s <= 1.0);
        }
        let _ = weighted_logrank(&table, &WeightFunction::log_rank());
    }
});
