use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data_cut::cut::CutObservation;
use crate::error::Result;

/// Risk-set summary at one event time of one stratum.
///
/// `s` is the left-continuous Kaplan-Meier estimate of the stratum's pooled
/// survival, i.e. the value just before `tte`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountingProcessRow {
    pub stratum: String,
    pub tte: f64,
    pub events: f64,
    pub treatment_events: f64,
    pub n_risk: f64,
    pub n_risk_treatment: f64,
    pub s: f64,
    pub o_minus_e: f64,
    pub var_o_minus_e: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountingProcess {
    pub rows: Vec<CountingProcessRow>,
}

impl CountingProcess {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn total_events(&self) -> f64 {
        self.rows.iter().map(|r| r.events).sum()
    }

    pub fn total_treatment_events(&self) -> f64 {
        self.rows.iter().map(|r| r.treatment_events).sum()
    }

    pub fn observed_minus_expected(&self) -> f64 {
        self.rows.iter().map(|r| r.o_minus_e).sum()
    }

    pub fn variance(&self) -> f64 {
        self.rows.iter().map(|r| r.var_o_minus_e).sum()
    }

    pub fn strata(&self) -> Vec<&str> {
        let mut strata: Vec<&str> = self.rows.iter().map(|r| r.stratum.as_str()).collect();
        strata.dedup();
        strata
    }
}

/// Builds the stratified counting process of `observations` for the arm
/// labelled `treatment`.
///
/// Tied event times are counted together (no continuity correction) and
/// anyone with `tte` equal to an event time is still at risk at it. Times
/// where one arm has nobody at risk contribute to the survival product but
/// produce no row, so a cut in which `treatment` has not enrolled yet gives
/// an empty table.
pub fn counting_process(observations: &[CutObservation], treatment: &str) -> Result<CountingProcess> {
    if observations.is_empty() {
        return Ok(CountingProcess::default());
    }

    let mut by_stratum: BTreeMap<&str, Vec<&CutObservation>> = BTreeMap::new();
    for o in observations {
        by_stratum.entry(o.stratum.as_str()).or_default().push(o);
    }

    let mut rows = Vec::new();
    for (stratum, mut group) in by_stratum {
        group.sort_by(|a, b| a.tte.total_cmp(&b.tte));
        build_stratum(stratum, &group, treatment, &mut rows);
    }
    Ok(CountingProcess { rows })
}

fn build_stratum(
    stratum: &str,
    sorted: &[&CutObservation],
    treatment: &str,
    rows: &mut Vec<CountingProcessRow>,
) {
    let n = sorted.len();
    let mut n_risk_treatment = sorted.iter().filter(|o| o.treatment == treatment).count();
    let mut survival = 1.0;
    let mut i = 0;
    while i < n {
        let t = sorted[i].tte;
        let n_risk = n - i;
        let mut events = 0usize;
        let mut treatment_events = 0usize;
        let mut leaving_treatment = 0usize;
        let mut j = i;
        while j < n && sorted[j].tte == t {
            let is_treatment = sorted[j].treatment == treatment;
            if is_treatment {
                leaving_treatment += 1;
            }
            if sorted[j].event {
                events += 1;
                if is_treatment {
                    treatment_events += 1;
                }
            }
            j += 1;
        }

        if events > 0 {
            if n_risk_treatment > 0 && n_risk_treatment < n_risk {
                rows.push(risk_set_row(
                    stratum,
                    t,
                    events as f64,
                    treatment_events as f64,
                    n_risk as f64,
                    n_risk_treatment as f64,
                    survival,
                ));
            }
            survival *= 1.0 - events as f64 / n_risk as f64;
        }

        n_risk_treatment -= leaving_treatment;
        i = j;
    }
}

fn risk_set_row(
    stratum: &str,
    tte: f64,
    events: f64,
    treatment_events: f64,
    n_risk: f64,
    n_risk_treatment: f64,
    s: f64,
) -> CountingProcessRow {
    let o_minus_e = treatment_events - events * n_risk_treatment / n_risk;
    let var_o_minus_e = if n_risk > 1.0 {
        events * (n_risk - events) * n_risk_treatment * (n_risk - n_risk_treatment)
            / (n_risk * n_risk * (n_risk - 1.0))
    } else {
        0.0
    };
    CountingProcessRow {
        stratum: stratum.to_string(),
        tte,
        events,
        treatment_events,
        n_risk,
        n_risk_treatment,
        s,
        o_minus_e,
        var_o_minus_e,
    }
}
