pub mod accel;
pub mod astar;
