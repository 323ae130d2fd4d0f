//! Background Tasks Module
//!
//! Contains background tasks that run alongside a cache.

mod sampler;

pub use sampler::{sample_pass, spawn_sampler, SamplerSettings};
