//! Predefined impairment profiles

use super::types::ImpairmentProfile;

/// Standard sweep, from unimpaired to heavily degraded
pub fn all_presets() -> Vec<ImpairmentProfile> {
    vec![
        ImpairmentProfile::baseline(),
        low_impairment(),
        medium_impairment(),
        high_impairment(),
    ]
}

/// Look up a preset by name
pub fn preset(name: &str) -> Option<ImpairmentProfile> {
    all_presets().into_iter().find(|p| p.name == name)
}

/// Typical home broadband
fn low_impairment() -> ImpairmentProfile {
    ImpairmentProfile::named("low_impairment")
        .with_latency(10.0)
        .with_jitter(2.0)
        .with_loss(0.5)
        .with_reorder(0.5)
}

/// Congested WiFi or a long-haul link
fn medium_impairment() -> ImpairmentProfile {
    ImpairmentProfile::named("medium_impairment")
        .with_latency(40.0)
        .with_jitter(8.0)
        .with_loss(2.0)
        .with_reorder(2.5)
        .with_bandwidth(100.0)
}

/// Degraded mobile link
fn high_impairment() -> ImpairmentProfile {
    ImpairmentProfile::named("high_impairment")
        .with_latency(100.0)
        .with_jitter(20.0)
        .with_loss(5.0)
        .with_reorder(5.0)
        .with_bandwidth(50.0)
}
