//! Build/runtime diagnostics, grounded on the teacher's `api::admin` info
//! report: which Cargo features this binary was compiled with, plus the
//! crate version, for a CLI `info`/status command to print.

#[allow(dead_code)]
mod built {
    include!(concat!(env!("OUT_DIR"), "/compiled_features.rs"));
}

#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    pub crate_version: &'static str,
    pub compiled_features: Vec<String>,
    pub runtime_flags: Vec<crate::config::FeatureFlag>,
}

#[must_use]
pub fn report() -> DiagnosticsReport {
    DiagnosticsReport {
        crate_version: env!("CARGO_PKG_VERSION"),
        compiled_features: built::COMPILED_FEATURES.iter().map(|s| (*s).to_string()).collect(),
        runtime_flags: crate::config::all(),
    }
}
