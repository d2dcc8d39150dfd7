//! Interval-valued coins.
//!
//! A coin is not a scalar balance but a slice of the global address space:
//! a `begin` address plus a positive `count`, covering the inclusive range
//! `[begin, begin + count - 1]`. The address space holds up to 2^259 units,
//! so addresses are arbitrary-width unsigned integers rendered as
//! `0x`-prefixed lowercase hex.

use std::fmt;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle of a coin inside one account's collection.
///
/// Transitions form the DAG `Unspent -> Selected -> LocalCommitted ->
/// Confirmed` plus the rollback edge `Selected -> Unspent`. `Confirmed` is
/// terminal within the account: the coin has been spent on chain and may be
/// garbage-collected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueState {
    Unspent,
    Selected,
    LocalCommitted,
    Confirmed,
}

impl ValueState {
    /// Wire/JSON name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            ValueState::Unspent => "unspent",
            ValueState::Selected => "selected",
            ValueState::LocalCommitted => "local_committed",
            ValueState::Confirmed => "confirmed",
        }
    }

    fn can_transition_to(self, next: ValueState) -> bool {
        use ValueState::*;
        matches!(
            (self, next),
            (Unspent, Selected)
                | (Selected, LocalCommitted)
                | (Selected, Unspent)
                | (LocalCommitted, Confirmed)
        )
    }
}

impl fmt::Display for ValueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An interval coin: `count` units starting at address `begin`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeValue {
    begin: BigUint,
    count: u64,
    state: ValueState,
}

impl RangeValue {
    /// New unspent coin. Fails when `count` is zero.
    pub fn new(begin: BigUint, count: u64) -> Result<Self> {
        Self::with_state(begin, count, ValueState::Unspent)
    }

    /// New coin in an explicit lifecycle state.
    pub fn with_state(begin: BigUint, count: u64, state: ValueState) -> Result<Self> {
        if count < 1 {
            return Err(Error::InvalidArgument("count must be at least 1".into()));
        }
        Ok(Self { begin, count, state })
    }

    /// New unspent coin from a `0x`-prefixed hex address.
    pub fn from_hex(begin_hex: &str, count: u64) -> Result<Self> {
        Self::from_hex_with_state(begin_hex, count, ValueState::Unspent)
    }

    /// New coin from a hex address in an explicit lifecycle state.
    pub fn from_hex_with_state(begin_hex: &str, count: u64, state: ValueState) -> Result<Self> {
        Self::with_state(parse_address(begin_hex)?, count, state)
    }

    /// First address covered by the coin.
    pub fn begin(&self) -> &BigUint {
        &self.begin
    }

    /// Last address covered by the coin (inclusive).
    pub fn end(&self) -> BigUint {
        &self.begin + (self.count - 1)
    }

    /// Number of units carried.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ValueState {
        self.state
    }

    /// `begin` rendered as `0x`-prefixed lowercase hex.
    pub fn begin_hex(&self) -> String {
        format!("0x{:x}", self.begin)
    }

    /// `end` rendered as `0x`-prefixed lowercase hex.
    pub fn end_hex(&self) -> String {
        format!("0x{:x}", self.end())
    }

    /// True when the coin is free to fund a payment.
    pub fn can_be_selected(&self) -> bool {
        self.state == ValueState::Unspent
    }

    /// Structural self-check; catches zero-count coins smuggled in through
    /// deserialized wire data.
    pub fn is_well_formed(&self) -> bool {
        self.count >= 1
    }

    /// Move to `next` along the lifecycle DAG. Equal states are a no-op;
    /// any edge outside the DAG is rejected.
    pub fn transition_to(&mut self, next: ValueState) -> Result<()> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidArgument(format!(
                "illegal state transition {} -> {}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Split off `change` units from the tail of the coin.
    ///
    /// Returns `(keep, change)` where `keep` covers
    /// `[begin, begin + count - change - 1]` and `change` covers the rest.
    /// Both halves inherit the parent's state. `change` must lie strictly
    /// inside `(0, count)`.
    pub fn split(&self, change: u64) -> Result<(RangeValue, RangeValue)> {
        if change == 0 || change >= self.count {
            return Err(Error::InvalidArgument(format!(
                "change {change} outside (0, {})",
                self.count
            )));
        }
        let keep = RangeValue {
            begin: self.begin.clone(),
            count: self.count - change,
            state: self.state,
        };
        let change_value = RangeValue {
            begin: keep.end() + 1u32,
            count: change,
            state: self.state,
        };
        Ok((keep, change_value))
    }

    /// Overlap with `other`: `None` when disjoint, otherwise the overlapping
    /// sub-interval plus the 0, 1, or 2 pieces of `self` that `other` does
    /// not cover. The intersection and the rest adopt `self`'s state.
    pub fn intersect(&self, other: &RangeValue) -> Option<(RangeValue, Vec<RangeValue>)> {
        let self_end = self.end();
        let other_end = other.end();
        let begin = self.begin.clone().max(other.begin.clone());
        let end = self_end.clone().min(other_end);
        if begin > end {
            return None;
        }

        let intersection = RangeValue {
            begin: begin.clone(),
            count: narrow(&end - &begin) + 1,
            state: self.state,
        };

        let mut rest = Vec::new();
        if self.begin < begin {
            rest.push(RangeValue {
                begin: self.begin.clone(),
                count: narrow(&begin - &self.begin),
                state: self.state,
            });
        }
        if end < self_end {
            rest.push(RangeValue {
                begin: &end + 1u32,
                count: narrow(&self_end - &end),
                state: self.state,
            });
        }
        Some((intersection, rest))
    }

    /// True when the two coins share at least one address.
    pub fn intersects(&self, other: &RangeValue) -> bool {
        self.end() >= other.begin && other.end() >= self.begin
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &RangeValue) -> bool {
        other.begin >= self.begin && other.end() <= self.end()
    }

    /// True when both coins cover exactly the same interval.
    pub fn same_span(&self, other: &RangeValue) -> bool {
        self.begin == other.begin && self.count == other.count
    }

    /// True when `next` starts exactly one address past the end of `self`.
    pub fn abuts(&self, next: &RangeValue) -> bool {
        self.end() + 1u32 == next.begin
    }

    /// Value record used by the transaction *hashing* form; includes `state`.
    pub fn hashing_record(&self) -> serde_json::Value {
        serde_json::json!({
            "begin_index": self.begin_hex(),
            "end_index": self.end_hex(),
            "value_num": self.count,
            "state": self.state.as_str(),
        })
    }

    /// Value record used by the transaction *signing* form; `state` is
    /// excluded so lifecycle transitions never invalidate a signature.
    pub fn signing_record(&self) -> serde_json::Value {
        serde_json::json!({
            "begin_index": self.begin_hex(),
            "end_index": self.end_hex(),
            "value_num": self.count,
        })
    }
}

impl fmt::Display for RangeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}] ({} units, {})",
            self.begin_hex(),
            self.end_hex(),
            self.count,
            self.state
        )
    }
}

/// Parse a `0x`-prefixed hex address into the address space.
fn parse_address(hex_str: &str) -> Result<BigUint> {
    let digits = hex_str.strip_prefix("0x").ok_or_else(|| {
        Error::InvalidArgument(format!("address {hex_str:?} must start with 0x"))
    })?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidArgument(format!(
            "address {hex_str:?} is not hexadecimal"
        )));
    }
    BigUint::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| Error::InvalidArgument(format!("address {hex_str:?} is not hexadecimal")))
}

/// Interval widths are bounded by a u64 count, so the conversion holds.
fn narrow(width: BigUint) -> u64 {
    u64::try_from(width).expect("interval width bounded by a u64 count")
}
