//! Asset identifiers.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Security identifier.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    From,
    Into,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct Sid(pub u32);

impl Sid {
    /// Raw identifier.
    pub const fn get(self) -> u32 {
        self.0
    }
}
