pub mod check;
pub mod conversion;
