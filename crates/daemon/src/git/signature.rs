// Commit signature status as reported by git's `%G?` placeholder.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    /// `G`
    Good,
    /// `U`: good signature, unknown validity.
    Untrusted,
    /// `X`
    ExpiredSignature,
    /// `Y`
    ExpiredKey,
    /// `B`
    Bad,
    /// `R`
    RevokedKey,
    /// `E`: signature present but cannot be checked (e.g. missing key).
    CannotCheck,
    /// `N`
    Unsigned,
    Unknown,
}

impl SignatureStatus {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "G" => Self::Good,
            "U" => Self::Untrusted,
            "X" => Self::ExpiredSignature,
            "Y" => Self::ExpiredKey,
            "B" => Self::Bad,
            "R" => Self::RevokedKey,
            "E" => Self::CannotCheck,
            "N" => Self::Unsigned,
            _ => Self::Unknown,
        }
    }

    /// Parse `git show --format=%G?` output. gpg may interleave its own
    /// lines, so the last non-empty line carries the code.
    pub fn from_show_output(stdout: &str) -> Self {
        stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map_or(Self::Unknown, Self::from_code)
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Good => "G",
            Self::Untrusted => "U",
            Self::ExpiredSignature => "X",
            Self::ExpiredKey => "Y",
            Self::Bad => "B",
            Self::RevokedKey => "R",
            Self::CannotCheck => "E",
            Self::Unsigned => "N",
            Self::Unknown => "?",
        }
    }

    /// A commit whose signature was produced by a key, even if that key is
    /// now untrusted or expired.
    pub const fn counts_as_signed(self) -> bool {
        matches!(self, Self::Good | Self::Untrusted | Self::ExpiredSignature | Self::ExpiredKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_codes() {
        for code in ["G", "U", "X", "Y"] {
            assert!(SignatureStatus::from_code(code).counts_as_signed(), "{code}");
        }
        for code in ["B", "R", "E", "N", "", "Z"] {
            assert!(!SignatureStatus::from_code(code).counts_as_signed(), "{code}");
        }
    }

    #[test]
    fn show_output_uses_last_non_empty_line() {
        let stdout = "gpg: Signature made Mon\ngpg: Good signature from \"Ada\"\nG\n\n";
        assert_eq!(SignatureStatus::from_show_output(stdout), SignatureStatus::Good);
        assert_eq!(SignatureStatus::from_show_output(""), SignatureStatus::Unknown);
    }

    #[test]
    fn codes_round_trip() {
        for code in ["G", "U", "X", "Y", "B", "R", "E", "N"] {
            assert_eq!(SignatureStatus::from_code(code).code(), code);
        }
    }
}
