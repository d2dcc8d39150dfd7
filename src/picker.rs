//! Funding selection for outgoing payments.
//!
//! The picker scans an account's unspent coins in insertion order until the
//! running sum covers the requested amount, splits the last coin when the
//! scan overshoots, and moves everything it touched to `Selected`. The
//! resulting selection carries the primary payment transaction, the optional
//! change transaction back to the sender, and the handles needed to commit,
//! confirm, or roll the selection back.

use crate::collection::{AccountValueCollection, NodeId, Position};
use crate::error::{Error, Result};
use crate::transaction::Transaction;
use crate::value::{RangeValue, ValueState};

/// Outcome of one pick.
#[derive(Clone, Debug)]
pub struct Selection {
    /// Handles of every value moved to `Selected`, change included.
    pub node_ids: Vec<NodeId>,
    /// Snapshot of the funding values after the change split.
    pub values: Vec<RangeValue>,
    /// Sum accumulated by the scan before change was split off.
    pub selected_sum: u128,
    /// Minted change value, when the scan overshot.
    pub change: Option<RangeValue>,
    /// Payment transaction to the recipient.
    pub primary: Transaction,
    /// Change transaction back to the sender, when change was minted.
    pub change_tx: Option<Transaction>,
}

/// Selects coins from one account's collection to fund payments.
pub struct ValuePicker {
    collection: AccountValueCollection,
}

impl ValuePicker {
    /// Picker over a fresh collection for `account_address`.
    pub fn new(account_address: impl Into<String>) -> Self {
        Self {
            collection: AccountValueCollection::new(account_address),
        }
    }

    /// Picker over an existing collection.
    pub fn from_collection(collection: AccountValueCollection) -> Self {
        Self { collection }
    }

    pub fn collection(&self) -> &AccountValueCollection {
        &self.collection
    }

    /// Append values to the account, back of the list. Returns how many
    /// were added.
    pub fn add_values(&mut self, values: Vec<RangeValue>) -> usize {
        let count = values.len();
        for value in values {
            self.collection.add(value, Position::Back);
        }
        count
    }

    /// Select unspent coins summing to at least `required` and build the
    /// payment transaction, splitting at most one coin for exact change.
    ///
    /// The scan walks the unspent set in insertion order, so the outcome is
    /// deterministic for a fixed insertion history. No split happens when
    /// the scan lands exactly on `required`.
    pub fn pick_for_payment(
        &mut self,
        required: u64,
        recipient: &str,
        nonce: u64,
    ) -> Result<Selection> {
        if required < 1 {
            return Err(Error::InvalidArgument(
                "payment amount must be at least 1".into(),
            ));
        }

        let mut chosen: Vec<NodeId> = Vec::new();
        let mut selected_sum: u128 = 0;
        for id in self.collection.ids_by_state(ValueState::Unspent) {
            if selected_sum >= u128::from(required) {
                break;
            }
            let value = self.collection.get(id).expect("scanned handle is live");
            selected_sum += u128::from(value.count());
            chosen.push(id);
        }

        if selected_sum < u128::from(required) {
            return Err(Error::InsufficientFunds {
                required,
                available: self.collection.balance(ValueState::Unspent),
            });
        }

        // The overflow is strictly smaller than the last coin scanned, so a
        // split can always carve it off.
        let change = selected_sum - u128::from(required);
        let change_id = if change > 0 {
            let last = *chosen.last().expect("selection covers at least one coin");
            Some(self.collection.split(last, change as u64)?)
        } else {
            None
        };

        let mut node_ids = chosen.clone();
        node_ids.extend(change_id);
        for id in &node_ids {
            self.collection.update_state(*id, ValueState::Selected)?;
        }

        let values: Vec<RangeValue> = chosen
            .iter()
            .map(|id| {
                self.collection
                    .get(*id)
                    .cloned()
                    .expect("selected handle is live")
            })
            .collect();
        let change_value = change_id.map(|id| {
            self.collection
                .get(id)
                .cloned()
                .expect("change handle is live")
        });

        let sender = self.collection.address().to_owned();
        let primary = Transaction::new(&sender, recipient, values.clone(), nonce);
        let change_tx = change_value.clone().map(|change| {
            Transaction::with_timestamp(
                &sender,
                &sender,
                vec![change],
                nonce,
                primary.timestamp.clone(),
            )
        });

        Ok(Selection {
            node_ids,
            values,
            selected_sum,
            change: change_value,
            primary,
            change_tx,
        })
    }

    /// Stage a broadcast selection: `Selected -> LocalCommitted`.
    pub fn commit(&mut self, selection: &Selection) -> Result<()> {
        self.transition_all(selection, ValueState::LocalCommitted)
    }

    /// Finalize an on-chain selection: `LocalCommitted -> Confirmed`.
    pub fn confirm(&mut self, selection: &Selection) -> Result<()> {
        self.transition_all(selection, ValueState::Confirmed)
    }

    /// Undo a rejected selection: `Selected -> Unspent`.
    pub fn rollback(&mut self, selection: &Selection) -> Result<()> {
        self.transition_all(selection, ValueState::Unspent)
    }

    fn transition_all(&mut self, selection: &Selection, state: ValueState) -> Result<()> {
        for id in &selection.node_ids {
            self.collection.update_state(*id, state)?;
        }
        Ok(())
    }

    /// Units held in a given state.
    pub fn balance(&self, state: ValueState) -> u128 {
        self.collection.balance(state)
    }

    /// Units held across all states.
    pub fn total_balance(&self) -> u128 {
        self.collection.total_balance()
    }

    /// Snapshot of held values, optionally filtered by state.
    pub fn values(&self, state: Option<ValueState>) -> Vec<RangeValue> {
        match state {
            Some(state) => self.collection.by_state(state).into_iter().cloned().collect(),
            None => self.collection.iter().cloned().collect(),
        }
    }

    /// Drop confirmed values. Returns the number removed.
    pub fn cleanup_confirmed(&mut self) -> usize {
        self.collection.clear_confirmed()
    }

    /// Fold abutting same-state runs into single coins.
    pub fn optimize(&mut self) -> usize {
        self.collection.merge_adjacent_runs()
    }

    /// Structural invariant check over the backing collection.
    pub fn validate_integrity(&self) -> bool {
        self.collection.validate_no_overlap() && self.collection.validate_indexes()
    }
}
