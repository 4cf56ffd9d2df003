//! Analysis cuts of ongoing trial data.
//!
//! Cutting never mutates its input. Because [`CutObservation`] implements
//! [`CalendarRecord`] as well, an analysis dataset can be cut again; cutting
//! at the same or a later date returns it unchanged and cutting at an earlier
//! date matches a single cut of the full data at that date.

use serde::{Deserialize, Serialize};

use crate::simulation::trial::Subject;

/// Anything that knows when it entered the study, when it left, and whether
/// it left through an event.
pub trait CalendarRecord {
    fn id(&self) -> usize;
    fn stratum(&self) -> &str;
    fn treatment(&self) -> &str;
    fn enroll_time(&self) -> f64;
    /// Calendar time at which follow-up ended.
    fn exit_time(&self) -> f64;
    fn exit_is_event(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutObservation {
    pub id: usize,
    pub stratum: String,
    pub treatment: String,
    pub enroll_time: f64,
    /// Calendar time at which follow-up ended in this cut.
    pub exit_time: f64,
    pub tte: f64,
    pub event: bool,
}

impl CalendarRecord for Subject {
    fn id(&self) -> usize {
        self.id
    }

    fn stratum(&self) -> &str {
        &self.stratum
    }

    fn treatment(&self) -> &str {
        &self.treatment
    }

    fn enroll_time(&self) -> f64 {
        self.enroll_time
    }

    fn exit_time(&self) -> f64 {
        self.cte
    }

    fn exit_is_event(&self) -> bool {
        self.fail
    }
}

impl CalendarRecord for CutObservation {
    fn id(&self) -> usize {
        self.id
    }

    fn stratum(&self) -> &str {
        &self.stratum
    }

    fn treatment(&self) -> &str {
        &self.treatment
    }

    fn enroll_time(&self) -> f64 {
        self.enroll_time
    }

    fn exit_time(&self) -> f64 {
        self.exit_time
    }

    fn exit_is_event(&self) -> bool {
        self.event
    }
}

pub fn cut_data_by_date<T: CalendarRecord>(data: &[T], cut_date: f64) -> Vec<CutObservation> {
    data.iter()
        .filter(|r| r.enroll_time() <= cut_date)
        .map(|r| {
            let exit = r.exit_time();
            let exit_time = exit.min(cut_date);
            CutObservation {
                id: r.id(),
                stratum: r.stratum().to_string(),
                treatment: r.treatment().to_string(),
                enroll_time: r.enroll_time(),
                exit_time,
                tte: exit_time - r.enroll_time(),
                event: r.exit_is_event() && exit <= cut_date,
            }
        })
        .collect()
}

/// Calendar date of the `target_event`-th event.
///
/// Every record whose exit equals that date is kept by the subsequent cut,
/// so ties can push the realized count above the target. When fewer events
/// ever occur the latest finite exit is returned (the latest enrollment if no
/// exit is finite), which keeps all data.
pub fn get_cut_date_by_event<T: CalendarRecord>(data: &[T], target_event: usize) -> f64 {
    if target_event == 0 {
        return 0.0;
    }
    let mut event_dates: Vec<f64> = data
        .iter()
        .filter(|r| r.exit_is_event() && r.exit_time().is_finite())
        .map(|r| r.exit_time())
        .collect();
    if event_dates.len() >= target_event {
        let (_, nth, _) = event_dates.select_nth_unstable_by(target_event - 1, f64::total_cmp);
        return *nth;
    }
    let last_exit = data
        .iter()
        .map(|r| r.exit_time())
        .filter(|t| t.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if last_exit.is_finite() {
        return last_exit;
    }
    data.iter()
        .map(|r| r.enroll_time())
        .fold(0.0, f64::max)
}

pub fn cut_data_by_event<T: CalendarRecord>(data: &[T], target_event: usize) -> Vec<CutObservation> {
    cut_data_by_date(data, get_cut_date_by_event(data, target_event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::rate_table::RateTable;
    use crate::simulation::trial::{simulate_trial, StratumShare, TrialDesign};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn subject(id: usize, enroll: f64, fail: f64, dropout: f64) -> Subject {
        Subject::new(id, "All".into(), "control".into(), enroll, fail, dropout)
    }

    fn toy() -> Vec<Subject> {
        vec![
            subject(1, 0.0, 5.0, 10.0),  // event at 5
            subject(2, 1.0, 8.0, 2.0),   // dropout at 3
            subject(3, 2.0, 2.0, 9.0),   // event at 4
            subject(4, 3.0, 2.0, 20.0),  // event at 5 (tie)
            subject(5, 6.0, 1.0, 20.0),  // enrolled after 5, event at 7
        ]
    }

    fn simulated(n: usize, seed: u64) -> Vec<Subject> {
        let design = TrialDesign {
            n,
            strata: StratumShare::single(),
            block: vec!["control".into(), "experimental".into()],
            enroll_rate: RateTable::from_durations(&[5.0], &[20.0]).unwrap(),
            fail_rate: RateTable::from_durations(&[3.0, 10.0], &[0.1, 0.05]).unwrap(),
            dropout_rate: RateTable::from_durations(&[10.0], &[0.01]).unwrap(),
        };
        simulate_trial(&design, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn test_cut_by_date() {
        let cut = cut_data_by_date(&toy(), 4.5);
        assert_eq!(cut.len(), 4);
        assert_eq!(cut[0].tte, 4.5);
        assert!(!cut[0].event);
        assert_eq!(cut[1].tte, 2.0);
        assert!(!cut[1].event);
        assert_eq!(cut[2].tte, 2.0);
        assert!(cut[2].event);
        assert_eq!(cut[3].tte, 1.5);
        assert!(!cut[3].event);
    }

    #[test]
    fn test_cut_out_of_range_is_empty() {
        assert!(cut_data_by_date(&toy(), -1.0).is_empty());
        let all = cut_data_by_date(&toy(), 1e9);
        assert_eq!(all.len(), 5);
        assert_eq!(all.iter().filter(|o| o.event).count(), 4);
    }

    #[test]
    fn test_cut_date_by_event_ties_included() {
        let data = toy();
        assert_eq!(get_cut_date_by_event(&data, 1), 4.0);
        assert_eq!(get_cut_date_by_event(&data, 2), 5.0);
        let cut = cut_data_by_event(&data, 2);
        // Subjects 1 and 4 both fail at calendar time 5.
        assert_eq!(cut.iter().filter(|o| o.event).count(), 3);
    }

    #[test]
    fn test_cut_date_never_reached() {
        let data = toy();
        assert_eq!(get_cut_date_by_event(&data, 10), 7.0);
        assert_eq!(cut_data_by_event(&data, 10), cut_data_by_date(&data, 7.0));
        assert_eq!(get_cut_date_by_event(&data, 0), 0.0);
        assert_eq!(get_cut_date_by_event::<Subject>(&[], 3), 0.0);
    }

    #[test]
    fn test_cut_date_with_infinite_exits() {
        let data = vec![
            subject(1, 1.0, f64::INFINITY, f64::INFINITY),
            subject(2, 2.5, f64::INFINITY, f64::INFINITY),
        ];
        assert_eq!(get_cut_date_by_event(&data, 1), 2.5);
        let cut = cut_data_by_event(&data, 1);
        assert_eq!(cut.len(), 2);
        assert!(cut.iter().all(|o| !o.event && o.tte.is_finite()));
    }

    #[test]
    fn test_recut_of_cut_data() {
        let data = simulated(300, 5);
        let cut = cut_data_by_date(&data, 8.0);
        assert_eq!(cut_data_by_date(&cut, 8.0), cut);
        assert_eq!(cut_data_by_date(&cut, 12.0), cut);
        assert_eq!(cut_data_by_date(&cut, 4.0), cut_data_by_date(&data, 4.0));
    }

    #[test]
    fn test_event_target_beyond_total() {
        let data = simulated(200, 6);
        let total_events = data.iter().filter(|s| s.fail).count();
        let last_exit = data.iter().map(|s| s.cte).fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(
            cut_data_by_event(&data, total_events + 5),
            cut_data_by_date(&data, last_exit)
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn cut_is_idempotent_and_associative(
            seed in 0u64..10_000,
            first in 0.5f64..15.0,
            second in 0.5f64..15.0,
        ) {
            let data = simulated(80, seed);
            let (early, late) = if first <= second { (first, second) } else { (second, first) };
            let once = cut_data_by_date(&data, late);
            prop_assert_eq!(cut_data_by_date(&once, late), once.clone());
            prop_assert_eq!(cut_data_by_date(&once, early), cut_data_by_date(&data, early));
        }

        #[test]
        fn event_cut_reaches_target(seed in 0u64..10_000, target in 1usize..60) {
            let data = simulated(120, seed);
            let total_events = data.iter().filter(|s| s.fail).count();
            let cut = cut_data_by_event(&data, target);
            let events = cut.iter().filter(|o| o.event).count();
            prop_assert!(events >= target.min(total_events));
        }
    }
}
