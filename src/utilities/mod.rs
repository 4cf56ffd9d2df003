pub mod matrix;
pub mod statistical;
pub mod validation;
