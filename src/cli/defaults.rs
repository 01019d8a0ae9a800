pub const MAX_COPY_NUMBER: u32 = 7;

pub const LAMBDA1: f64 = 1.0;

pub const LAMBDA2: f64 = 0.01;

pub const MAX_ITERATIONS: usize = 10;

pub const CONVERGENCE_TOLERANCE: f64 = 1e-6;

pub const SEED: u64 = 1;
