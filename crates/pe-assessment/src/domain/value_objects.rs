//! # Value Objects
//!
//! Identity, address and handle types shared by every layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::{AddressParseError, ValidationError};

/// Number of answers in one questionnaire.
pub const ANSWER_COUNT: usize = 15;

/// Lowest accepted answer value (inclusive).
pub const MIN_ANSWER: u32 = 1;

/// Highest accepted answer value (inclusive).
pub const MAX_ANSWER: u32 = 5;

/// Answers contributing to each result field.
pub const ANSWERS_PER_FIELD: usize = 5;

/// Network (chain) identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn parse_hex_array<const N: usize>(s: &str) -> Result<[u8; N], AddressParseError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.len() != N * 2 {
        return Err(AddressParseError::Length {
            expected: N,
            got: digits.len() / 2,
        });
    }
    let bytes = hex::decode(digits).map_err(|e| AddressParseError::Hex(e.to_string()))?;
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

macro_rules! hex_identifier {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// All-zero value.
            pub const ZERO: Self = Self([0u8; $len]);

            /// Raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// True for the all-zero value.
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $len]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = AddressParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_hex_array::<$len>(s).map(Self)
            }
        }

        impl TryFrom<String> for $name {
            type Error = AddressParseError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_string()
            }
        }
    };
}

hex_identifier!(
    /// Externally-owned account acting as signer.
    AccountAddress,
    20
);

hex_identifier!(
    /// Address of the deployed assessment contract.
    ContractAddress,
    20
);

hex_identifier!(
    /// Opaque reference to a ciphertext held by the ledger.
    ///
    /// The all-zero value is the empty sentinel: no ciphertext exists for
    /// the field yet.
    Handle,
    32
);

hex_identifier!(
    /// Ledger transaction hash.
    TxHash,
    32
);

impl Handle {
    /// The "no ciphertext yet" sentinel.
    pub const EMPTY: Self = Self::ZERO;

    /// True when this is the empty sentinel.
    pub fn is_empty(&self) -> bool {
        self.is_zero()
    }

    /// Leading hex digits, for log lines and displays.
    pub fn short(&self) -> String {
        let full = self.to_string();
        full.chars().take(18).collect()
    }
}

/// The three confidential result fields, in storage order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResultField {
    /// Stress level. The primary field.
    Stress,
    /// Extroversion score.
    Extroversion,
    /// Intuition score.
    Intuition,
}

impl ResultField {
    /// All fields in storage order.
    pub const ALL: [ResultField; 3] = [
        ResultField::Stress,
        ResultField::Extroversion,
        ResultField::Intuition,
    ];

    /// Storage index of the field.
    pub fn index(self) -> usize {
        match self {
            ResultField::Stress => 0,
            ResultField::Extroversion => 1,
            ResultField::Intuition => 2,
        }
    }
}

impl fmt::Display for ResultField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultField::Stress => "stress",
            ResultField::Extroversion => "extroversion",
            ResultField::Intuition => "intuition",
        };
        f.write_str(name)
    }
}

/// A revealed plaintext, paired with the handle it was decrypted from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearValue {
    /// Handle the value was decrypted from.
    pub handle: Handle,
    /// Plaintext.
    pub value: u64,
}

/// Snapshot of the execution identity.
///
/// Two contexts are equal iff network, account and contract all match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Connected network, if any.
    pub network: Option<ChainId>,
    /// Active signer account, if any.
    pub account: Option<AccountAddress>,
    /// Contract resolved for the network, if deployed there.
    pub contract: Option<ContractAddress>,
}

impl ExecutionContext {
    /// True when a contract is bound.
    pub fn is_bound(&self) -> bool {
        self.contract.is_some()
    }
}

/// A validated questionnaire: exactly 15 answers, each in `[1, 5]`.
///
/// The order is positional; the orchestrator never interprets categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Answers([u32; ANSWER_COUNT]);

impl Answers {
    /// Validate a raw answer sequence.
    pub fn new(raw: &[u32]) -> Result<Self, ValidationError> {
        if raw.len() != ANSWER_COUNT {
            return Err(ValidationError::WrongLength {
                expected: ANSWER_COUNT,
                got: raw.len(),
            });
        }
        let mut values = [0u32; ANSWER_COUNT];
        for (index, (slot, &value)) in values.iter_mut().zip(raw).enumerate() {
            if !(MIN_ANSWER..=MAX_ANSWER).contains(&value) {
                return Err(ValidationError::OutOfRange { index, value });
            }
            *slot = value;
        }
        Ok(Self(values))
    }

    /// Answers in submission order.
    pub fn values(&self) -> &[u32; ANSWER_COUNT] {
        &self.0
    }
}
