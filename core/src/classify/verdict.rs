use serde::{Deserialize, Serialize};

/// Encryption-status verdict for a transponder.
///
/// UNKNOWN is the initial state only; once any evidence has been folded the
/// verdict moves between the other four states and never returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Unknown,
    Secure,
    Unencrypted,
    Obfuscated,
    FurtherAnalysis,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Unknown => "UNKNOWN",
            Verdict::Secure => "SECURE",
            Verdict::Unencrypted => "UNENCRYPTED",
            Verdict::Obfuscated => "OBFUSCATED",
            Verdict::FurtherAnalysis => "FURTHER_ANALYSIS",
        }
    }

    /// Tie-break ordering. Equal-weight evidence resolves toward the more
    /// conservative label, so UNENCRYPTED is never asserted on a coin flip.
    pub fn conservative_rank(&self) -> u8 {
        match self {
            Verdict::Secure => 3,
            Verdict::FurtherAnalysis => 2,
            Verdict::Obfuscated => 1,
            Verdict::Unencrypted => 0,
            Verdict::Unknown => 0,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conservative_ordering_prefers_secure_over_unencrypted() {
        assert!(Verdict::Secure.conservative_rank() > Verdict::FurtherAnalysis.conservative_rank());
        assert!(
            Verdict::FurtherAnalysis.conservative_rank() > Verdict::Obfuscated.conservative_rank()
        );
        assert!(Verdict::Obfuscated.conservative_rank() > Verdict::Unencrypted.conservative_rank());
    }
}
