pub mod align;
pub mod clip;
pub mod resample;
