//! Reference model implementations.

pub mod srgan;
