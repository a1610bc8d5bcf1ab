//! Optional backend detection.

use serde::{Deserialize, Serialize};

/// Backends that are compiled in behind cargo features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCapabilities {
    /// EVTX parsing (feature `evtx`)
    pub evtx: bool,
    /// PDF text extraction (feature `pdf`)
    pub pdf: bool,
}

impl BackendCapabilities {
    /// Reports the backends present in this build.
    pub fn detect() -> Self {
        Self {
            evtx: cfg!(feature = "evtx"),
            pdf: cfg!(feature = "pdf"),
        }
    }

    /// Names of backends missing from this build.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.evtx {
            missing.push("evtx");
        }
        if !self.pdf {
            missing.push("pdf");
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capabilities() {
        let caps = BackendCapabilities::default();
        assert!(!caps.evtx);
        assert_eq!(caps.missing(), vec!["evtx", "pdf"]);
    }

    #[test]
    fn test_detect_matches_features() {
        let caps = BackendCapabilities::detect();
        assert_eq!(caps.evtx, cfg!(feature = "evtx"));
        assert_eq!(caps.pdf, cfg!(feature = "pdf"));
    }
}
