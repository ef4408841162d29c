//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `gcir_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    println!("gcir_core version={}", gcir_core::core_version());
    println!("gcir_core default_log_level={}", gcir_core::default_log_level());
}
