pub const PROBABILITY_SUM_TOL: f64 = 1e-6;
pub const PSD_PIVOT_TOL: f64 = 1e-8;
pub const SINGULAR_PIVOT: f64 = 1e-10;
pub const DEFAULT_MVN_MAX_POINTS: usize = 50_000;
pub const DEFAULT_MVN_ABS_EPS: f64 = 1e-5;
pub const DEFAULT_MVN_REL_EPS: f64 = 0.0;
pub const DEFAULT_MVN_SEED: u64 = 20_240_917;
pub const MVN_SHIFTS: usize = 12;
pub const MVN_INITIAL_BATCH: usize = 64;
pub const MVN_ERROR_SIGMAS: f64 = 3.0;
pub const DEFAULT_CONTROL_LABEL: &str = "control";
pub const DEFAULT_EXPERIMENTAL_LABEL: &str = "experimental";
pub const DEFAULT_ALPHA: f64 = 0.025;

#[cfg(test)]
pub const TEST_STRICT_TOL: f64 = 1e-4;
