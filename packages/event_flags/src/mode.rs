//! Decoding of the guest wait mode.
//!
//! A raw mode packs two independent selectors. The low nibble selects how the requested bits are
//! combined, the remaining bits select what a successful wait does to the pattern.

/// Raw mode bit: every requested bit must be set.
pub const WAIT_AND: u32 = 0x01;

/// Raw mode bit: at least one requested bit must be set.
pub const WAIT_OR: u32 = 0x02;

/// Raw mode bit: a successful wait clears the requested bits.
pub const WAIT_CLEAR: u32 = 0x10;

/// Raw mode bit: a successful wait clears the entire pattern.
pub const WAIT_CLEAR_ALL: u32 = 0x20;

const COMBINATION_MASK: u32 = 0xf;

/// How the requested bits are combined when checking the pattern.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Combination {
    /// Every requested bit must be present.
    All,

    /// At least one requested bit must be present.
    Any,
}

/// What a successful wait does to the live pattern.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Consumption {
    /// The pattern is left unchanged.
    Keep,

    /// The requested bits are cleared from the pattern.
    ClearMatched,

    /// The whole pattern is reset to zero.
    ClearAll,
}

/// A decoded wait mode.
///
/// # Example
///
/// ```
/// use event_flags::{Combination, Consumption, WAIT_CLEAR, WAIT_OR, WaitMode};
///
/// let mode = WaitMode::from_raw(WAIT_OR | WAIT_CLEAR).unwrap();
/// assert_eq!(mode.combination(), Combination::Any);
/// assert_eq!(mode.consumption(), Consumption::ClearMatched);
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct WaitMode {
    combination: Combination,
    consumption: Consumption,
}

impl WaitMode {
    /// Wait for all requested bits, leave the pattern unchanged.
    pub const ALL: Self = Self::new(Combination::All, Consumption::Keep);

    /// Wait for any requested bit, leave the pattern unchanged.
    pub const ANY: Self = Self::new(Combination::Any, Consumption::Keep);

    /// Creates a wait mode from its two selectors.
    #[must_use]
    pub const fn new(combination: Combination, consumption: Consumption) -> Self {
        Self {
            combination,
            consumption,
        }
    }

    /// Decodes a raw guest mode, returning [`None`] if either selector is unrecognized.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        let combination = match raw & COMBINATION_MASK {
            WAIT_AND => Combination::All,
            WAIT_OR => Combination::Any,
            _ => return None,
        };

        let consumption = match raw & !COMBINATION_MASK {
            0 => Consumption::Keep,
            WAIT_CLEAR => Consumption::ClearMatched,
            WAIT_CLEAR_ALL => Consumption::ClearAll,
            _ => return None,
        };

        Some(Self::new(combination, consumption))
    }

    /// Encodes the mode back into its raw guest representation.
    #[must_use]
    pub const fn to_raw(self) -> u32 {
        let combination = match self.combination {
            Combination::All => WAIT_AND,
            Combination::Any => WAIT_OR,
        };

        let consumption = match self.consumption {
            Consumption::Keep => 0,
            Consumption::ClearMatched => WAIT_CLEAR,
            Consumption::ClearAll => WAIT_CLEAR_ALL,
        };

        combination | consumption
    }

    /// The combination policy of this mode.
    #[must_use]
    pub const fn combination(self) -> Combination {
        self.combination
    }

    /// The consumption policy of this mode.
    #[must_use]
    pub const fn consumption(self) -> Consumption {
        self.consumption
    }

    /// Returns the same combination policy with a different consumption policy.
    #[must_use]
    pub const fn with_consumption(self, consumption: Consumption) -> Self {
        Self::new(self.combination, consumption)
    }
}

/// Returns whether a raw guest mode decodes into one recognized combination policy and one
/// recognized consumption policy.
#[must_use]
pub const fn check_mode(raw: u32) -> bool {
    WaitMode::from_raw(raw).is_some()
}
