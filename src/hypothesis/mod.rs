pub mod maxcombo;
pub mod mvn;
pub mod weighted_logrank;
pub mod weights;
