pub mod board;
pub mod indices;
pub mod request;
pub mod rules;
