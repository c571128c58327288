/// Re-export `Config` from `linkpulse-core` for use within this crate.
///
/// All environment-variable parsing lives in `linkpulse-core` so it can be
/// shared with integration tests without depending on the full server.
pub use linkpulse_core::config::Config;
