pub mod fail_rate;
pub mod piecewise;
pub mod randomization;
pub mod rate_table;
pub mod trial;
