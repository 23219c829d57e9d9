//! Named network-impairment profiles
//!
//! A profile describes the total round-trip impairment applied while a
//! benchmark runs. The runner splits it across the two endpoints.

mod presets;
mod types;

pub use presets::{all_presets, preset};
pub use types::{EndpointImpairment, ImpairmentProfile, BASELINE};
