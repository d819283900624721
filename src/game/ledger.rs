//! Settlement Ledger
//!
//! Owns the balance and the bet history. `debit`, `settle` and `record_loss`
//! are the only ways to change either.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::round::{RoundId, Wager, WagerState};

/// How a wager ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Player cashed out before the crash.
    CashedOut,
    /// Round crashed first.
    Crashed,
}

/// Immutable history record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Round the wager rode on.
    pub round_id: RoundId,
    /// Stake.
    pub amount: f64,
    /// Cash-out multiplier, or the crash point for a loss.
    pub multiplier: f64,
    /// Amount credited; zero for a loss.
    pub payout: f64,
    /// How it ended.
    pub outcome: Outcome,
    /// When the entry was written.
    pub settled_at: DateTime<Utc>,
}

/// Ledger errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    /// Debit exceeds balance.
    #[error("Insufficient balance: requested {requested:.2}, available {available:.2}")]
    InsufficientBalance {
        /// Requested amount.
        requested: f64,
        /// Balance at the time.
        available: f64,
    },

    /// Amount is not a positive finite number.
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    /// Wager already settled.
    #[error("Wager already settled")]
    AlreadySettled,
}

/// Balance and history.
#[derive(Clone, Debug)]
pub struct Ledger {
    balance: f64,
    history: Vec<HistoryEntry>,
}

impl Ledger {
    /// Open a ledger with a starting balance.
    pub fn new(initial_balance: f64) -> Self {
        debug_assert!(initial_balance >= 0.0);
        Self {
            balance: initial_balance,
            history: Vec::new(),
        }
    }

    /// Current balance.
    #[inline]
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// History, oldest first.
    #[inline]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Take `amount` off the balance.
    pub fn debit(&mut self, amount: f64) -> Result<(), LedgerError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if amount > self.balance {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: self.balance,
            });
        }

        self.balance -= amount;
        Ok(())
    }

    /// Cash out `wager` at `multiplier`, crediting the payout.
    ///
    /// Returns the payout. A wager can be settled once.
    pub fn settle(&mut self, wager: &mut Wager, multiplier: f64) -> Result<f64, LedgerError> {
        if !wager.is_open() {
            return Err(LedgerError::AlreadySettled);
        }

        let payout = wager.amount() * multiplier;
        wager.set_state(WagerState::CashedOut { multiplier, payout });
        self.balance += payout;

        self.history.push(HistoryEntry {
            round_id: wager.round_id(),
            amount: wager.amount(),
            multiplier,
            payout,
            outcome: Outcome::CashedOut,
            settled_at: Utc::now(),
        });

        Ok(payout)
    }

    /// Close an uncashed wager as lost. Credits nothing.
    pub fn record_loss(&mut self, wager: &mut Wager, crash_multiplier: f64) -> Result<(), LedgerError> {
        if !wager.is_open() {
            return Err(LedgerError::AlreadySettled);
        }

        wager.set_state(WagerState::Lost);
        self.history.push(HistoryEntry {
            round_id: wager.round_id(),
            amount: wager.amount(),
            multiplier: crash_multiplier,
            payout: 0.0,
            outcome: Outcome::Crashed,
            settled_at: Utc::now(),
        });

        Ok(())
    }

    /// Net result across all history: payouts minus stakes.
    pub fn net_profit(&self) -> f64 {
        self.history.iter().map(|e| e.payout - e.amount).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_debit() {
        let mut ledger = Ledger::new(1000.0);
        ledger.debit(10.0).unwrap();
        assert_eq!(ledger.balance(), 990.0);
    }

    #[test]
    fn test_debit_insufficient() {
        let mut ledger = Ledger::new(5.0);
        let err = ledger.debit(10.0).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(ledger.balance(), 5.0);
    }

    #[test]
    fn test_debit_whole_balance() {
        let mut ledger = Ledger::new(5.0);
        ledger.debit(5.0).unwrap();
        assert_eq!(ledger.balance(), 0.0);
    }

    #[test]
    fn test_debit_invalid_amounts() {
        let mut ledger = Ledger::new(100.0);
        for amount in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(ledger.debit(amount), Err(LedgerError::InvalidAmount(_))));
        }
        assert_eq!(ledger.balance(), 100.0);
    }

    #[test]
    fn test_settle_credits_and_records() {
        let mut ledger = Ledger::new(1000.0);
        let mut wager = Wager::new(RoundId::new(1), 10.0);
        ledger.debit(10.0).unwrap();

        let payout = ledger.settle(&mut wager, 2.1).unwrap();
        assert!(close(payout, 21.0));
        assert!(close(ledger.balance(), 1011.0));
        assert!(wager.cashed_out());

        let entry = &ledger.history()[0];
        assert_eq!(entry.amount, 10.0);
        assert_eq!(entry.multiplier, 2.1);
        assert_eq!(entry.outcome, Outcome::CashedOut);
    }

    #[test]
    fn test_settle_twice_rejected() {
        let mut ledger = Ledger::new(1000.0);
        let mut wager = Wager::new(RoundId::new(1), 10.0);
        ledger.debit(10.0).unwrap();
        ledger.settle(&mut wager, 2.0).unwrap();

        let err = ledger.settle(&mut wager, 3.0).unwrap_err();
        assert_eq!(err, LedgerError::AlreadySettled);
        assert!(close(ledger.balance(), 1010.0));
        assert_eq!(ledger.history().len(), 1);
    }

    #[test]
    fn test_record_loss() {
        let mut ledger = Ledger::new(1000.0);
        let mut wager = Wager::new(RoundId::new(1), 10.0);
        ledger.debit(10.0).unwrap();

        ledger.record_loss(&mut wager, 3.5).unwrap();
        assert_eq!(ledger.balance(), 990.0);
        assert_eq!(wager.state(), WagerState::Lost);

        let entry = &ledger.history()[0];
        assert_eq!(entry.payout, 0.0);
        assert_eq!(entry.outcome, Outcome::Crashed);

        // No second record, and no cash-out after a loss
        assert_eq!(ledger.record_loss(&mut wager, 3.5), Err(LedgerError::AlreadySettled));
        assert_eq!(ledger.settle(&mut wager, 2.0), Err(LedgerError::AlreadySettled));
        assert_eq!(ledger.history().len(), 1);
    }

    #[test]
    fn test_loss_after_cash_out_rejected() {
        let mut ledger = Ledger::new(100.0);
        let mut wager = Wager::new(RoundId::new(1), 10.0);
        ledger.debit(10.0).unwrap();
        ledger.settle(&mut wager, 1.5).unwrap();

        assert_eq!(ledger.record_loss(&mut wager, 4.0), Err(LedgerError::AlreadySettled));
    }

    #[test]
    fn test_net_profit() {
        let mut ledger = Ledger::new(100.0);

        let mut win = Wager::new(RoundId::new(1), 10.0);
        ledger.debit(10.0).unwrap();
        ledger.settle(&mut win, 3.0).unwrap();

        let mut loss = Wager::new(RoundId::new(2), 5.0);
        ledger.debit(5.0).unwrap();
        ledger.record_loss(&mut loss, 1.2).unwrap();

        assert!(close(ledger.net_profit(), 15.0));
        assert!(close(ledger.balance(), 115.0));
    }
}
