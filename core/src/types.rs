//! Identifiers and amounts shared by every component of the ticket economy.
//!
//! Amounts are plain integers wrapped in newtypes so that credit units,
//! external value units and basis points can never be mixed up:
//!
//! - [`Credits`]: internal fungible currency tracked by the ledger
//! - [`NativeValue`]: external value paid in and released out of the ledger
//! - [`ExchangeRate`]: external value units per credit unit (always > 0)
//! - [`BasisPoints`]: fractions of 10 000, used for fees and the resale cap

use crate::error::{EconomyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU128;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Identity key of a participant, a treasury sub-account or a marketplace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(Uuid);

impl Address {
    /// The null identity. Never a valid recipient.
    pub const NULL: Self = Self(Uuid::nil());

    /// Creates a new random `Address`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an `Address` from a UUID
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Whether this is the null identity
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Externally supplied, globally unique event identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    /// Creates an `EventId`, rejecting blank identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidInput`] if `id` is empty or whitespace.
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(EconomyError::InvalidInput(
                "event id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ticket identifier, sequential per event and 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketId(u64);

impl TicketId {
    /// Creates a `TicketId` from its sequence number
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the sequence number
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A privilege held by an identity on one registry instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// May grant and revoke capabilities and appoint the marketplace
    Admin,
    /// May bulk-mint tickets and withdraw the treasury
    Minter,
    /// May scan tickets at the gate
    Scanner,
    /// May move tickets between holders and update the customer set
    Marketplace,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Admin => "admin",
            Self::Minter => "minter",
            Self::Scanner => "scanner",
            Self::Marketplace => "marketplace",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Amounts
// ============================================================================

/// Amount of the internal credit currency.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Credits(u64);

impl Credits {
    /// Zero credits
    pub const ZERO: Self = Self(0);

    /// Creates a credit amount
    #[must_use]
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    /// Returns the raw number of credit units
    #[must_use]
    pub const fn units(&self) -> u64 {
        self.0
    }

    /// Checks if this amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::Overflow`] if the sum does not fit.
    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.0.checked_add(other.0).map(Self).ok_or(EconomyError::Overflow)
    }

    /// Subtracts `other`, returning `None` if it exceeds `self`.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(units) => Some(Self(units)),
            None => None,
        }
    }

    /// Multiplies by a count (e.g. `quantity × ticketPrice`).
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::Overflow`] if the product does not fit.
    pub fn checked_mul(self, count: u64) -> Result<Self> {
        self.0.checked_mul(count).map(Self).ok_or(EconomyError::Overflow)
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cr", self.0)
    }
}

/// Amount of external value (the unit credits are bought with).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NativeValue(u128);

impl NativeValue {
    /// No value
    pub const ZERO: Self = Self(0);

    /// Creates a value amount
    #[must_use]
    pub const fn new(units: u128) -> Self {
        Self(units)
    }

    /// Returns the raw number of value units
    #[must_use]
    pub const fn units(&self) -> u128 {
        self.0
    }

    /// Checks if this amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::Overflow`] if the sum does not fit.
    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.0.checked_add(other.0).map(Self).ok_or(EconomyError::Overflow)
    }

    /// Subtracts `other`, returning `None` if it exceeds `self`.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(units) => Some(Self(units)),
            None => None,
        }
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} value", self.0)
    }
}

/// External value units per credit unit. Always strictly positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeRate(NonZeroU128);

impl ExchangeRate {
    /// Creates an exchange rate.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::InvalidInput`] if `value_per_credit` is zero.
    pub fn new(value_per_credit: u128) -> Result<Self> {
        NonZeroU128::new(value_per_credit)
            .map(Self)
            .ok_or_else(|| EconomyError::InvalidInput("rate must be positive".to_string()))
    }

    /// Returns the number of value units one credit costs
    #[must_use]
    pub const fn value_per_credit(&self) -> u128 {
        self.0.get()
    }

    /// Converts paid value into credits: `floor(value / rate)`.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::Overflow`] if the result exceeds the credit range.
    pub fn credits_for(&self, value: NativeValue) -> Result<Credits> {
        let units = value.units() / self.0.get();
        u64::try_from(units)
            .map(Credits::new)
            .map_err(|_| EconomyError::Overflow)
    }

    /// Converts credits back into value: `credits × rate`.
    ///
    /// # Errors
    ///
    /// Returns [`EconomyError::Overflow`] if the product does not fit.
    pub fn value_of(&self, credits: Credits) -> Result<NativeValue> {
        u128::from(credits.units())
            .checked_mul(self.0.get())
            .map(NativeValue::new)
            .ok_or(EconomyError::Overflow)
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} value/cr", self.0)
    }
}

/// A fraction expressed in basis points (1/10 000).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BasisPoints(u32);

impl BasisPoints {
    /// 100%
    pub const WHOLE: Self = Self(10_000);

    /// Creates a basis-point value
    #[must_use]
    pub const fn new(bps: u32) -> Self {
        Self(bps)
    }

    /// Returns the raw basis points
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Applies the fraction to an amount, rounding down.
    #[must_use]
    pub fn of(&self, amount: Credits) -> Credits {
        let scaled = u128::from(amount.units()) * u128::from(self.0) / 10_000;
        // A fraction above 100% can exceed u64; saturate rather than wrap.
        Credits::new(u64::try_from(scaled).unwrap_or(u64::MAX))
    }

    /// Whether `amount` is at most this fraction of `base`, compared exactly.
    #[must_use]
    pub fn admits(&self, amount: Credits, base: Credits) -> bool {
        u128::from(amount.units()) * 10_000 <= u128::from(base.units()) * u128::from(self.0)
    }
}

impl fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bps", self.0)
    }
}
