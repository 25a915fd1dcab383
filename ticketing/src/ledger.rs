//! Credit ledger.
//!
//! Owns every account balance of the credit currency and the external value
//! paid in for it. Accounts are created lazily on first credit and never
//! deleted. Registries keep their proceeds in treasury sub-accounts opened
//! here, so every debit and credit in the economy goes through this one API.
//! Treasuries are debited only through crate-internal settlement; the public
//! transfer and withdrawal paths refuse them as a source.
//!
//! **Conservation**: the sum of all balances always equals
//! [`Ledger::total_supply`], which only changes on acquisition (mint) and
//! withdrawal (burn).
//!
//! **Atomicity**: every operation validates under the ledger lock before it
//! mutates anything. Multi-leg movements (refund batches, resale proceeds
//! plus fee) go through [`Ledger::settle`], which checks all legs first.

use crate::metrics;
use festival_core::observation::{Observation, ObservationLog};
use festival_core::types::{Address, Credits, ExchangeRate, NativeValue};
use festival_core::{EconomyError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// ============================================================================
// Data Structures
// ============================================================================

/// One leg of a settlement: move `amount` from `from` to `to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Leg {
    pub(crate) from: Address,
    pub(crate) to: Address,
    pub(crate) amount: Credits,
}

impl Leg {
    pub(crate) const fn new(from: Address, to: Address, amount: Credits) -> Self {
        Self { from, to, amount }
    }
}

#[derive(Debug)]
struct LedgerState {
    owner: Address,
    rate: ExchangeRate,
    balances: HashMap<Address, Credits>,
    treasuries: HashSet<Address>,
    total_supply: Credits,
    reserve: NativeValue,
}

impl LedgerState {
    fn balance(&self, identity: &Address) -> Credits {
        self.balances.get(identity).copied().unwrap_or(Credits::ZERO)
    }

    fn ensure_owner(&self, caller: Address, action: &'static str) -> Result<()> {
        if caller == self.owner {
            Ok(())
        } else {
            Err(EconomyError::Unauthorized { caller, action })
        }
    }

    fn ensure_not_treasury(&self, from: Address, action: &'static str) -> Result<()> {
        if self.treasuries.contains(&from) {
            tracing::warn!(treasury = %from, action, "Rejected direct debit of a treasury");
            Err(EconomyError::Unauthorized {
                caller: from,
                action,
            })
        } else {
            Ok(())
        }
    }

    /// Dry-runs `legs` against a scratch copy of the touched balances.
    fn validate_legs(&self, legs: &[Leg]) -> Result<()> {
        let mut scratch: HashMap<Address, Credits> = HashMap::new();
        for leg in legs {
            if leg.to.is_null() {
                return Err(EconomyError::InvalidRecipient);
            }
            let available = *scratch
                .entry(leg.from)
                .or_insert_with(|| self.balance(&leg.from));
            let remaining =
                available
                    .checked_sub(leg.amount)
                    .ok_or(EconomyError::InsufficientBalance {
                        account: leg.from,
                        available,
                        required: leg.amount,
                    })?;
            scratch.insert(leg.from, remaining);

            let credited = *scratch.entry(leg.to).or_insert_with(|| self.balance(&leg.to));
            scratch.insert(leg.to, credited.checked_add(leg.amount)?);
        }
        Ok(())
    }

    /// Applies a leg that already passed [`Self::validate_legs`].
    fn apply_leg(&mut self, leg: &Leg) {
        let from = self.balance(&leg.from);
        self.balances.insert(
            leg.from,
            from.checked_sub(leg.amount).unwrap_or(Credits::ZERO),
        );
        let to = self.balance(&leg.to);
        self.balances.insert(
            leg.to,
            Credits::new(to.units().saturating_add(leg.amount.units())),
        );
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Shared credit ledger. Cloning yields another handle to the same balances.
#[derive(Clone)]
pub struct Ledger {
    state: Arc<Mutex<LedgerState>>,
    log: ObservationLog,
}

impl Ledger {
    /// Creates an empty ledger owned by `owner`.
    #[must_use]
    pub fn new(owner: Address, rate: ExchangeRate, log: ObservationLog) -> Self {
        tracing::info!(%owner, %rate, "Ledger created");
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                owner,
                rate,
                balances: HashMap::new(),
                treasuries: HashSet::new(),
                total_supply: Credits::ZERO,
                reserve: NativeValue::ZERO,
            })),
            log,
        }
    }

    /// Issues `floor(value / rate)` credits to `identity` against paid-in value.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::InvalidInput`] if `value` is zero
    /// - [`EconomyError::InvalidRecipient`] if `identity` is the null identity
    /// - [`EconomyError::Overflow`] if the supply or reserve would overflow
    pub fn acquire_credit(&self, identity: Address, value: NativeValue) -> Result<Credits> {
        if value.is_zero() {
            tracing::warn!(%identity, "Rejected credit acquisition without payment");
            return Err(EconomyError::InvalidInput(
                "payment must be greater than zero".to_string(),
            ));
        }
        if identity.is_null() {
            return Err(EconomyError::InvalidRecipient);
        }

        let mut state = self.state.lock();
        let amount = state.rate.credits_for(value)?;
        let supply = state.total_supply.checked_add(amount)?;
        let reserve = state.reserve.checked_add(value)?;
        let balance = state.balance(&identity).checked_add(amount)?;

        state.balances.insert(identity, balance);
        state.total_supply = supply;
        state.reserve = reserve;

        self.log.record(Observation::CreditReceived {
            identity,
            amount,
            value,
        });
        metrics::record_credit_acquired(amount);
        tracing::info!(%identity, %amount, %value, "Credit acquired");
        Ok(amount)
    }

    /// Current balance of `identity` (zero for unknown accounts).
    #[must_use]
    pub fn check_credit(&self, identity: Address) -> Credits {
        self.state.lock().balance(&identity)
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// Every accepted transfer is observed, including zero amounts.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::Unauthorized`] if `from` is a registry treasury
    /// - [`EconomyError::InvalidRecipient`] if `to` is the null identity
    /// - [`EconomyError::InsufficientBalance`] if `from` cannot cover `amount`
    pub fn transfer(&self, from: Address, to: Address, amount: Credits) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_not_treasury(from, "transfer treasury funds")?;
        self.apply_locked(&mut state, &[Leg::new(from, to, amount)], true)
    }

    /// Like [`Ledger::transfer`], but only the account holder may initiate it.
    ///
    /// # Errors
    ///
    /// [`EconomyError::Unauthorized`] unless `authorizer == from`, then the
    /// errors of [`Ledger::transfer`].
    pub fn transfer_delegated(
        &self,
        authorizer: Address,
        from: Address,
        to: Address,
        amount: Credits,
    ) -> Result<()> {
        if authorizer != from {
            tracing::warn!(%authorizer, %from, "Rejected delegated transfer");
            return Err(EconomyError::Unauthorized {
                caller: authorizer,
                action: "transfer credit on behalf of another account",
            });
        }
        self.transfer(from, to, amount)
    }

    /// Replaces the exchange rate. Owner-only.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::Unauthorized`] if `caller` is not the owner
    /// - [`EconomyError::InvalidInput`] if `value_per_credit` is zero
    pub fn set_rate(&self, caller: Address, value_per_credit: u128) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_owner(caller, "set the exchange rate")?;
        let rate = ExchangeRate::new(value_per_credit)?;
        state.rate = rate;

        self.log.record(Observation::RateChanged { rate });
        tracing::info!(%rate, "Exchange rate changed");
        Ok(())
    }

    /// Burns `amount` credits from `identity` and releases `amount × rate`
    /// external value to them.
    ///
    /// # Errors
    ///
    /// - [`EconomyError::InvalidInput`] if `amount` is zero
    /// - [`EconomyError::Unauthorized`] if `identity` is a registry treasury
    /// - [`EconomyError::InsufficientBalance`] if `identity` holds less than `amount`
    /// - [`EconomyError::InsufficientReserve`] if held value cannot cover the release
    pub fn withdraw_value(&self, identity: Address, amount: Credits) -> Result<NativeValue> {
        if amount.is_zero() {
            return Err(EconomyError::InvalidInput(
                "withdrawal amount must be greater than zero".to_string(),
            ));
        }

        let mut state = self.state.lock();
        state.ensure_not_treasury(identity, "withdraw treasury funds")?;
        let available = state.balance(&identity);
        let remaining = available
            .checked_sub(amount)
            .ok_or(EconomyError::InsufficientBalance {
                account: identity,
                available,
                required: amount,
            })?;
        let value = state.rate.value_of(amount)?;
        let reserve = state
            .reserve
            .checked_sub(value)
            .ok_or(EconomyError::InsufficientReserve {
                available: state.reserve,
                required: value,
            })?;

        state.balances.insert(identity, remaining);
        state.total_supply = state
            .total_supply
            .checked_sub(amount)
            .unwrap_or(Credits::ZERO);
        state.reserve = reserve;

        self.log.record(Observation::CreditWithdrawn {
            identity,
            amount,
            value,
        });
        metrics::record_credit_withdrawn(amount);
        tracing::info!(%identity, %amount, %value, "Credit withdrawn for value");
        Ok(value)
    }

    /// Releases all held external value to the owner. Owner-only.
    ///
    /// Balances are untouched; later holder withdrawals may then fail with
    /// [`EconomyError::InsufficientReserve`].
    ///
    /// # Errors
    ///
    /// - [`EconomyError::Unauthorized`] if `caller` is not the owner
    /// - [`EconomyError::NothingToWithdraw`] if no value is held
    pub fn owner_withdraw_value(&self, caller: Address) -> Result<NativeValue> {
        let mut state = self.state.lock();
        state.ensure_owner(caller, "withdraw held value")?;
        if state.reserve.is_zero() {
            return Err(EconomyError::NothingToWithdraw);
        }
        let value = std::mem::take(&mut state.reserve);

        self.log.record(Observation::ValueSwept {
            owner: caller,
            value,
        });
        tracing::info!(owner = %caller, %value, "Held value swept");
        Ok(value)
    }

    /// Opens a fresh, empty treasury sub-account.
    #[must_use]
    pub fn open_treasury(&self) -> Address {
        let treasury = Address::new();
        let mut state = self.state.lock();
        state.balances.insert(treasury, Credits::ZERO);
        state.treasuries.insert(treasury);
        tracing::debug!(%treasury, "Treasury opened");
        treasury
    }

    /// Applies every leg or none of them.
    ///
    /// Zero-amount legs are validated but neither applied nor observed.
    pub(crate) fn settle(&self, legs: &[Leg]) -> Result<()> {
        let mut state = self.state.lock();
        self.apply_locked(&mut state, legs, false)
    }

    /// Whether `identity` is a registry treasury
    #[must_use]
    pub fn is_treasury(&self, identity: Address) -> bool {
        self.state.lock().treasuries.contains(&identity)
    }

    fn apply_locked(&self, state: &mut LedgerState, legs: &[Leg], observe_zero: bool) -> Result<()> {
        if let Err(error) = state.validate_legs(legs) {
            tracing::warn!(legs = legs.len(), %error, "Settlement rejected");
            return Err(error);
        }

        let mut applied = 0;
        for leg in legs.iter().filter(|leg| observe_zero || !leg.amount.is_zero()) {
            state.apply_leg(leg);
            self.log.record(Observation::CreditTransferred {
                from: leg.from,
                to: leg.to,
                amount: leg.amount,
            });
            tracing::debug!(from = %leg.from, to = %leg.to, amount = %leg.amount, "Credit transferred");
            applied += 1;
        }
        metrics::record_transfers(applied);
        Ok(())
    }

    // ========== Queries ==========

    /// Ledger owner
    #[must_use]
    pub fn owner(&self) -> Address {
        self.state.lock().owner
    }

    /// Current exchange rate
    #[must_use]
    pub fn rate(&self) -> ExchangeRate {
        self.state.lock().rate
    }

    /// Sum of all balances
    #[must_use]
    pub fn total_supply(&self) -> Credits {
        self.state.lock().total_supply
    }

    /// External value currently held
    #[must_use]
    pub fn reserve(&self) -> NativeValue {
        self.state.lock().reserve
    }

    /// Observation log this ledger records into
    #[must_use]
    pub fn observations(&self) -> &ObservationLog {
        &self.log
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Ledger")
            .field("owner", &state.owner)
            .field("rate", &state.rate)
            .field("accounts", &state.balances.len())
            .field("total_supply", &state.total_supply)
            .field("reserve", &state.reserve)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
