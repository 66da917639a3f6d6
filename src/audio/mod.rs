// Module audio - Clock sources for the timing engine

pub mod timing;
