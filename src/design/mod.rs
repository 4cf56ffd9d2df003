pub mod analysis_cut;
pub mod fixed_design;
pub mod group_sequential;
pub mod replicate;
pub mod summary;
pub mod test_spec;
