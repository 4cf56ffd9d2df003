use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data_cut::cut::{get_cut_date_by_event, CalendarRecord};
use crate::utilities::validation::{validate_parameter, ValidationError};

/// Rule for the calendar date of one analysis.
///
/// Each configured condition yields a date and the analysis happens at the
/// latest of them:
///
/// - `planned_calendar_time`;
/// - the date of the `target_event`-th event, but no later than
///   `max_extension_for_target_event`;
/// - the `min_n_overall`-th enrollment plus `min_followup`;
/// - per stratum, the `min_n_per_stratum`-th enrollment plus `min_followup`;
/// - the previous analysis date plus `min_time_after_previous_analysis`.
///
/// `min_followup` without a sample-size condition applies to the last
/// enrollment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisCut {
    pub planned_calendar_time: Option<f64>,
    pub target_event: Option<usize>,
    pub max_extension_for_target_event: Option<f64>,
    pub min_n_overall: Option<usize>,
    pub min_n_per_stratum: Option<usize>,
    pub min_followup: Option<f64>,
    pub min_time_after_previous_analysis: Option<f64>,
}

impl AnalysisCut {
    pub fn at_time(planned_calendar_time: f64) -> Self {
        Self {
            planned_calendar_time: Some(planned_calendar_time),
            ..Self::default()
        }
    }

    pub fn at_events(target_event: usize) -> Self {
        Self {
            target_event: Some(target_event),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (value, field) in [
            (self.planned_calendar_time, "planned_calendar_time"),
            (self.max_extension_for_target_event, "max_extension_for_target_event"),
            (self.min_followup, "min_followup"),
            (self.min_time_after_previous_analysis, "min_time_after_previous_analysis"),
        ] {
            if let Some(v) = value {
                validate_parameter(v, field)?;
            }
        }
        if self.max_extension_for_target_event.is_some() && self.target_event.is_none() {
            return Err(ValidationError::InvalidValue {
                field: "max_extension_for_target_event",
                message: "requires target_event".to_string(),
            });
        }
        let configured = self.planned_calendar_time.is_some()
            || self.target_event.is_some()
            || self.min_n_overall.is_some()
            || self.min_n_per_stratum.is_some()
            || self.min_followup.is_some()
            || self.min_time_after_previous_analysis.is_some();
        if !configured {
            return Err(ValidationError::InvalidValue {
                field: "analysis_cut",
                message: "no cutting condition configured".to_string(),
            });
        }
        Ok(())
    }

    /// Calendar cut date of this analysis on the full simulated `data`.
    /// `previous_cut` is the date of the preceding analysis, if any.
    pub fn analysis_date<T: CalendarRecord>(
        &self,
        data: &[T],
        previous_cut: Option<f64>,
    ) -> Result<f64, ValidationError> {
        self.validate()?;
        let followup = self.min_followup.unwrap_or(0.0);
        let mut dates: Vec<f64> = Vec::with_capacity(5);

        if let Some(t) = self.planned_calendar_time {
            dates.push(t);
        }
        if let Some(target) = self.target_event {
            let date = get_cut_date_by_event(data, target);
            dates.push(
                self.max_extension_for_target_event
                    .map_or(date, |cap| date.min(cap)),
            );
        }
        if let Some(min_n) = self.min_n_overall {
            let enrollments: Vec<f64> = data.iter().map(|r| r.enroll_time()).collect();
            dates.push(nth_enrollment(enrollments, min_n) + followup);
        }
        if let Some(min_n) = self.min_n_per_stratum {
            let mut by_stratum: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
            for r in data {
                by_stratum.entry(r.stratum()).or_default().push(r.enroll_time());
            }
            let latest = by_stratum
                .into_values()
                .map(|enrollments| nth_enrollment(enrollments, min_n))
                .fold(0.0, f64::max);
            dates.push(latest + followup);
        }
        if self.min_followup.is_some() && self.min_n_overall.is_none() && self.min_n_per_stratum.is_none() {
            let last = data.iter().map(|r| r.enroll_time()).fold(0.0, f64::max);
            dates.push(last + followup);
        }
        if let Some(gap) = self.min_time_after_previous_analysis {
            dates.push(previous_cut.unwrap_or(0.0) + gap);
        }

        Ok(dates.into_iter().fold(f64::NEG_INFINITY, f64::max))
    }
}

/// Enrollment time of the `n`-th subject, or the last one when fewer enrolled.
fn nth_enrollment(mut enrollments: Vec<f64>, n: usize) -> f64 {
    if enrollments.is_empty() {
        return 0.0;
    }
    enrollments.sort_by(f64::total_cmp);
    let index = n.clamp(1, enrollments.len()) - 1;
    enrollments[index]
}
