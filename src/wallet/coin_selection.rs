// Bitcoin Dev Kit
// Written in 2020 by Alekos Filini <alekos.filini@gmail.com>
//
// Copyright (c) 2020-2021 Bitcoin Dev Kit Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Coin selection
//!
//! Chooses which unspent outputs fund a transaction. Two algorithms are
//! provided: [`select_bnb`], a branch-and-bound search for a changeless input
//! set minimizing a fee-waste metric, and [`select_knapsack`], a randomized
//! subset-sum approximation used as its fallback. [`select_srd`] is the last
//! resort when neither produces a usable set.
//!
//! Both selectors sort or shuffle the pool they are handed, which is why the
//! pool is taken by mutable reference.
//!
//! ## Example
//!
//! ```
//! use coinkit::wallet::coin_selection::{select_coins, InputCoin};
//! use coinkit::{OutPoint, Script, TxOut};
//!
//! let coin = |vout: u32, value: i64| InputCoin {
//!     outpoint: OutPoint {
//!         txid: Default::default(),
//!         vout,
//!     },
//!     txout: TxOut {
//!         value,
//!         script_pubkey: Script::new(),
//!     },
//!     effective_value: value,
//!     fee: 0,
//!     long_term_fee: 0,
//!     input_bytes: -1,
//! };
//! let mut pool = vec![coin(0, 50_000), coin(1, 20_000)];
//!
//! // branch-and-bound first, knapsack when no changeless set exists
//! let (selected, value) = select_coins(&mut pool, 60_000, 10_000)?;
//! assert_eq!(value, 70_000);
//! assert_eq!(selected.len(), 2);
//! # Ok::<(), coinkit::Error>(())
//! ```

use std::cmp;
use std::collections::BTreeSet;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
#[cfg(not(test))]
use rand::thread_rng;
#[cfg(test)]
use rand::{rngs::StdRng, SeedableRng};

use serde::{Deserialize, Serialize};

use crate::encode;
use crate::transaction::{OutPoint, Transaction, TxOut};
use crate::types::{FeeRate, COIN};

/// Iteration cap of the branch-and-bound search.
const BNB_TOTAL_TRIES: usize = 100_000;

/// Target minimum change amount.
pub const MIN_CHANGE: i64 = COIN / 100;

/// Trials performed by each randomized subset-sum approximation.
const KNAPSACK_ITERATIONS: usize = 1000;

/// Why a selection attempt produced no input set.
///
/// A failing [`select_bnb`] is an expected condition (no changeless set
/// exists); callers fall back to [`select_knapsack`]. A failing knapsack is
/// terminal for the transaction being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionError {
    /// The pool cannot cover the target even if fully spent
    InsufficientFunds {
        /// Amount that was asked for
        needed: i64,
        /// Amount the pool can provide
        available: i64,
    },
    /// The search space was exhausted without finding a suitable set
    NoSolution,
    /// The pool itself is unusable for selection
    InvalidInput(&'static str),
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::InsufficientFunds { needed, available } => write!(
                f,
                "Insufficient funds: {} available of {} needed",
                available, needed
            ),
            SelectionError::NoSolution => write!(f, "No solution found"),
            SelectionError::InvalidInput(msg) => write!(f, "Invalid selection input: {}", msg),
        }
    }
}

impl std::error::Error for SelectionError {}

/// A candidate input annotated with the fee data selection decides on.
///
/// Identity (equality and ordering) is by [`outpoint`](Self::outpoint) alone,
/// which is what makes a set of selected coins well defined.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InputCoin {
    /// The unspent output this coin would spend
    pub outpoint: OutPoint,
    /// The output itself
    pub txout: TxOut,
    /// Value minus the fee for spending this coin at the chosen feerate
    pub effective_value: i64,
    /// Fee for spending this coin at the chosen feerate
    pub fee: i64,
    /// Fee for spending this coin at the long-term feerate estimate
    pub long_term_fee: i64,
    /// Estimated size of this coin as a fully-signed input, or -1 if it could
    /// not be calculated
    pub input_bytes: i32,
}

impl InputCoin {
    /// A coin spending output `vout` of `tx`. The effective value starts out
    /// as the raw value; callers adjust it once a feerate is known.
    pub fn new(tx: &Transaction, vout: u32) -> Result<Self, crate::error::Error> {
        let outpoint = OutPoint::new(tx.txid(), vout);
        let txout = tx
            .output
            .get(vout as usize)
            .cloned()
            .ok_or(crate::error::Error::InvalidOutpoint(outpoint))?;
        Ok(InputCoin {
            outpoint,
            effective_value: txout.value,
            txout,
            fee: 0,
            long_term_fee: 0,
            input_bytes: -1,
        })
    }

    /// A coin spending output `vout` of a transaction read back from
    /// byte-blob storage in its serialized form.
    pub fn from_tx_bytes(bytes: &[u8], vout: u32) -> Result<Self, crate::error::Error> {
        let tx: Transaction = encode::deserialize(bytes)?;
        Self::new(&tx, vout)
    }

    /// Attach the estimated fully-signed input size.
    pub fn with_input_bytes(mut self, input_bytes: i32) -> Self {
        self.input_bytes = input_bytes;
        self
    }
}

impl PartialEq for InputCoin {
    fn eq(&self, other: &Self) -> bool {
        self.outpoint == other.outpoint
    }
}

impl Eq for InputCoin {}

impl PartialOrd for InputCoin {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InputCoin {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.outpoint.cmp(&other.outpoint)
    }
}

/// Coins spendable to the same destination, bundled so they are selected
/// together and never leak which outputs share an address.
#[derive(Debug, Clone)]
pub struct OutputGroup {
    /// The coins in the group
    pub coins: Vec<InputCoin>,
    /// Whether every coin was sent by this wallet
    pub from_me: bool,
    /// Sum of the raw values
    pub value: i64,
    /// Smallest confirmation depth in the group
    pub depth: i32,
    /// Total unconfirmed ancestors across the group
    pub ancestors: usize,
    /// Largest descendant count as seen from the group's top ancestor
    pub descendants: usize,
    /// Sum of the effective values
    pub effective_value: i64,
    /// Sum of the fees at the chosen feerate
    pub fee: i64,
    /// Sum of the fees at the long-term feerate estimate
    pub long_term_fee: i64,
}

impl Default for OutputGroup {
    fn default() -> Self {
        OutputGroup {
            coins: Vec::new(),
            from_me: true,
            value: 0,
            depth: 999,
            ancestors: 0,
            descendants: 0,
            effective_value: 0,
            fee: 0,
            long_term_fee: 0,
        }
    }
}

impl OutputGroup {
    /// Add a coin to the group, folding its depth and mempool stats into the
    /// group-wide aggregates. With `positive_only`, coins that cost more to
    /// spend than they are worth are left out.
    pub fn insert(
        &mut self,
        coin: InputCoin,
        depth: i32,
        from_me: bool,
        ancestors: usize,
        descendants: usize,
        positive_only: bool,
    ) {
        if positive_only && coin.effective_value <= 0 {
            return;
        }
        self.from_me &= from_me;
        self.value += coin.txout.value;
        self.depth = cmp::min(self.depth, depth);
        self.ancestors += ancestors;
        self.descendants = cmp::max(self.descendants, descendants);
        self.effective_value += coin.effective_value;
        self.fee += coin.fee;
        self.long_term_fee += coin.long_term_fee;
        self.coins.push(coin);
    }

    /// Whether the whole group passes `filter`.
    pub fn eligible_for_spending(&self, filter: &CoinEligibilityFilter) -> bool {
        self.depth
            >= if self.from_me {
                filter.conf_mine
            } else {
                filter.conf_theirs
            }
            && self.ancestors <= filter.max_ancestors
            && self.descendants <= filter.max_descendants
    }
}

/// Depth and mempool limits a group must satisfy to be spendable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinEligibilityFilter {
    /// Minimum confirmations for coins this wallet sent to itself
    pub conf_mine: i32,
    /// Minimum confirmations for coins received from others
    pub conf_theirs: i32,
    /// Maximum unconfirmed ancestors
    pub max_ancestors: usize,
    /// Maximum unconfirmed descendants
    pub max_descendants: usize,
    /// Include partial destination groups when full groups are not eligible
    pub include_partial_groups: bool,
}

impl CoinEligibilityFilter {
    /// A filter with the descendant limit equal to the ancestor limit.
    pub fn new(conf_mine: i32, conf_theirs: i32, max_ancestors: usize) -> Self {
        CoinEligibilityFilter {
            conf_mine,
            conf_theirs,
            max_ancestors,
            max_descendants: max_ancestors,
            include_partial_groups: false,
        }
    }
}

/// Everything about the transaction being built that selection needs to price
/// its decisions.
#[derive(Debug, Clone, Copy)]
pub struct CoinSelectionParams {
    /// Serialized size of the change output that would be added
    pub change_output_size: usize,
    /// Size of the future input that spends that change output
    pub change_spend_size: usize,
    /// Feerate of the transaction being built
    pub effective_feerate: FeeRate,
    /// Feerate estimate over the long term
    pub long_term_feerate: FeeRate,
    /// Feerate below which change is discarded into the fee instead
    pub discard_feerate: FeeRate,
    /// Size of the transaction before any inputs are added
    pub tx_noinputs_size: usize,
    /// Whether the fee is deducted from the recipients' outputs
    pub subtract_fee_outputs: bool,
    /// Whether coins sharing a destination must be spent together
    pub avoid_partial_spends: bool,
}

impl CoinSelectionParams {
    /// The cost of both creating the change output now and spending it later,
    /// which is the width of the window a changeless selection may overshoot
    /// the target by.
    pub fn cost_of_change(&self) -> i64 {
        (self.discard_feerate.fee_vb(self.change_spend_size)
            + self.effective_feerate.fee_vb(self.change_output_size)) as i64
    }
}

/// The full selection chain: a changeless set if branch-and-bound can find
/// one, otherwise whatever the knapsack settles on.
///
/// `actual_target` includes the fees already accumulated for everything but
/// the inputs; `cost_of_change` only bounds the branch-and-bound window, the
/// knapsack prices change on its own.
pub fn select_coins(
    pool: &mut [InputCoin],
    actual_target: i64,
    cost_of_change: i64,
) -> Result<(BTreeSet<InputCoin>, i64), crate::error::Error> {
    match select_bnb(pool, actual_target, cost_of_change) {
        Ok(result) => Ok(result),
        Err(err) => {
            log::debug!("bnb found no selection ({}), trying knapsack", err);
            Ok(select_knapsack(pool, actual_target)?)
        }
    }
}

/// Branch-and-bound selection of a changeless input set.
///
/// Searches subsets of `pool` whose effective value lands in
/// `[actual_target, actual_target + cost_of_change]`, minimizing the waste
/// metric: the cost of spending the inputs now rather than at the long-term
/// feerate, plus the overshoot of the target. The pool is sorted in place by
/// descending effective value.
///
/// On success the returned amount is the sum of the selected coins' *raw*
/// values. Failure to find a set is normal; callers fall back to
/// [`select_knapsack`].
pub fn select_bnb(
    pool: &mut [InputCoin],
    actual_target: i64,
    cost_of_change: i64,
) -> Result<(BTreeSet<InputCoin>, i64), SelectionError> {
    if pool.is_empty() {
        return Err(SelectionError::InvalidInput("empty pool"));
    }
    // Filtering out coins that shrink the selected amount is the caller's
    // job; a search over them cannot make progress.
    if pool.iter().any(|coin| coin.effective_value <= 0) {
        return Err(SelectionError::InvalidInput(
            "non-positive effective value in pool",
        ));
    }

    pool.sort_unstable_by(|a, b| b.effective_value.cmp(&a.effective_value));

    let mut curr_available_value: i64 = pool.iter().map(|coin| coin.effective_value).sum();
    if curr_available_value < actual_target {
        return Err(SelectionError::InsufficientFunds {
            needed: actual_target,
            available: curr_available_value,
        });
    }

    log::debug!(
        "bnb: target = `{}`, cost_of_change = `{}`, pool of {}",
        actual_target,
        cost_of_change,
        pool.len()
    );

    // curr_selection[i] tells whether pool[i] is in the set being explored;
    // its length is the search depth.
    let mut curr_selection: Vec<bool> = Vec::with_capacity(pool.len());
    let mut curr_value: i64 = 0;
    let mut curr_waste: i64 = 0;
    let mut best_selection: Vec<bool> = Vec::new();
    let mut best_waste = i64::MAX;

    for _ in 0..BNB_TOTAL_TRIES {
        let mut backtrack = false;

        if curr_value + curr_available_value < actual_target
            // Cannot possibly reach the target with what is left to explore
            || curr_value > actual_target + cost_of_change
            // Overshot the window, this subtree is dead
            || (curr_waste > best_waste && pool[0].fee - pool[0].long_term_fee > 0)
        // Waste only grows on inclusion at this feerate, so a worse partial
        // waste can never recover
        {
            backtrack = true;
        } else if curr_value >= actual_target {
            // Within the window: charge the overshoot to the waste and
            // compare against the best set found so far. Anything added past
            // this point would only burn value into fees, so backtrack either
            // way.
            curr_waste += curr_value - actual_target;
            if curr_waste <= best_waste {
                best_selection = curr_selection.clone();
                best_selection.resize(pool.len(), false);
                best_waste = curr_waste;
                if best_waste == 0 {
                    break;
                }
            }
            curr_waste -= curr_value - actual_target;
            backtrack = true;
        }

        if backtrack {
            // Walk back to the last included coin that still has its
            // omission branch to explore.
            while curr_selection.last() == Some(&false) {
                curr_selection.pop();
                curr_available_value += pool[curr_selection.len()].effective_value;
            }

            if curr_selection.is_empty() {
                // Every branch has been walked; whatever is in best_selection
                // is the answer.
                break;
            }

            let last = curr_selection.len() - 1;
            curr_selection[last] = false;
            let coin = &pool[last];
            curr_value -= coin.effective_value;
            curr_waste -= coin.fee - coin.long_term_fee;
        } else {
            let depth = curr_selection.len();
            let coin = &pool[depth];

            curr_available_value -= coin.effective_value;

            // A coin identical in effective value and fee to an excluded
            // predecessor spans a subtree that has already been searched.
            if depth > 0
                && !curr_selection[depth - 1]
                && coin.effective_value == pool[depth - 1].effective_value
                && coin.fee == pool[depth - 1].fee
            {
                curr_selection.push(false);
            } else {
                // Inclusion branch first (largest-first exploration)
                curr_selection.push(true);
                curr_value += coin.effective_value;
                curr_waste += coin.fee - coin.long_term_fee;
            }
        }
    }

    if best_selection.is_empty() {
        return Err(SelectionError::NoSolution);
    }

    let mut selected = BTreeSet::new();
    let mut value = 0;
    for (coin, included) in pool.iter().zip(&best_selection) {
        if *included {
            value += coin.txout.value;
            selected.insert(coin.clone());
        }
    }

    log::debug!("bnb: selected {} coins worth `{}`", selected.len(), value);

    Ok((selected, value))
}

/// Knapsack selection: randomized subset-sum with a nearest-larger fallback.
///
/// Works on raw values. Returns the single coin matching `target` exactly if
/// one exists; otherwise approximates the smallest subset total reaching
/// `target` (and failing an exact hit, `target + MIN_CHANGE`, so change is
/// worth creating), preferring the smallest single larger coin when it beats
/// the subset. The pool is shuffled in place.
pub fn select_knapsack(
    pool: &mut [InputCoin],
    target: i64,
) -> Result<(BTreeSet<InputCoin>, i64), SelectionError> {
    if pool.is_empty() {
        return Err(SelectionError::InvalidInput("empty pool"));
    }

    #[cfg(not(test))]
    let mut rng = thread_rng();
    #[cfg(test)]
    let mut rng: StdRng = SeedableRng::from_seed([0; 32]);

    pool.shuffle(&mut rng);

    let mut coin_lowest_larger: Option<InputCoin> = None;
    let mut lesser: Vec<InputCoin> = Vec::new();
    let mut total_lower: i64 = 0;

    for coin in pool.iter() {
        if coin.txout.value == target {
            return Ok((singleton(coin.clone()), coin.txout.value));
        } else if coin.txout.value < target + MIN_CHANGE {
            total_lower += coin.txout.value;
            lesser.push(coin.clone());
        } else if coin_lowest_larger
            .as_ref()
            .map_or(true, |lowest| coin.txout.value < lowest.txout.value)
        {
            coin_lowest_larger = Some(coin.clone());
        }
    }

    if total_lower == target {
        let value = total_lower;
        return Ok((lesser.into_iter().collect(), value));
    }

    if total_lower < target {
        return match coin_lowest_larger {
            Some(coin) => {
                let value = coin.txout.value;
                Ok((singleton(coin), value))
            }
            None => Err(SelectionError::InsufficientFunds {
                needed: target,
                available: total_lower,
            }),
        };
    }

    // Solve subset sum by stochastic approximation
    lesser.sort_unstable_by(|a, b| b.txout.value.cmp(&a.txout.value));
    let (mut best_included, mut best_value) =
        approximate_best_subset(&mut rng, &lesser, total_lower, target);
    if best_value != target && total_lower >= target + MIN_CHANGE {
        let second = approximate_best_subset(&mut rng, &lesser, total_lower, target + MIN_CHANGE);
        best_included = second.0;
        best_value = second.1;
    }

    // Prefer the bigger coin when the approximation either fell short of
    // usable change or is no cheaper than the bigger coin anyway.
    if let Some(coin) = coin_lowest_larger {
        if (best_value != target && best_value < target + MIN_CHANGE)
            || coin.txout.value <= best_value
        {
            let value = coin.txout.value;
            return Ok((singleton(coin), value));
        }
    }

    let mut selected = BTreeSet::new();
    let mut value = 0;
    for (coin, included) in lesser.into_iter().zip(best_included) {
        if included {
            value += coin.txout.value;
            selected.insert(coin);
        }
    }

    log::debug!(
        "knapsack: best subset of {} coins, total `{}`",
        selected.len(),
        value
    );

    Ok((selected, value))
}

/// Single random draw: shuffle and accumulate until the target is covered.
///
/// The bluntest of the selectors, used when a caller wants an unbiased input
/// set and the cleverer searches have nothing to offer. Compares effective
/// values against the target, returns the raw value sum like the others.
pub fn select_srd(
    pool: &mut [InputCoin],
    target: i64,
) -> Result<(BTreeSet<InputCoin>, i64), SelectionError> {
    if pool.is_empty() {
        return Err(SelectionError::InvalidInput("empty pool"));
    }

    #[cfg(not(test))]
    let mut rng = thread_rng();
    #[cfg(test)]
    let mut rng: StdRng = SeedableRng::from_seed([0; 32]);

    pool.shuffle(&mut rng);

    let mut selected = BTreeSet::new();
    let mut effective = 0;
    let mut value = 0;
    for coin in pool.iter() {
        effective += coin.effective_value;
        value += coin.txout.value;
        selected.insert(coin.clone());
        if effective >= target {
            return Ok((selected, value));
        }
    }

    Err(SelectionError::InsufficientFunds {
        needed: target,
        available: effective,
    })
}

// Randomized subset-sum: each trial flips a coin per entry in a first pass
// and force-includes what is missing in a second, remembering the smallest
// total that reached the target across all trials.
fn approximate_best_subset<R: Rng>(
    rng: &mut R,
    coins: &[InputCoin],
    total_lower: i64,
    target: i64,
) -> (Vec<bool>, i64) {
    let mut best_included = vec![true; coins.len()];
    let mut best_value = total_lower;

    for _ in 0..KNAPSACK_ITERATIONS {
        if best_value == target {
            break;
        }

        let mut included = vec![false; coins.len()];
        let mut total: i64 = 0;
        let mut reached_target = false;
        for pass in 0..2 {
            if reached_target {
                break;
            }
            for i in 0..coins.len() {
                // The randomness here serves no security purpose, it only
                // prevents degenerate behavior across repeated trials.
                let pick = if pass == 0 {
                    rng.gen_bool(0.5)
                } else {
                    !included[i]
                };
                if pick {
                    total += coins[i].txout.value;
                    included[i] = true;
                    if total >= target {
                        reached_target = true;
                        if total < best_value {
                            best_value = total;
                            best_included = included.clone();
                        }
                        total -= coins[i].txout.value;
                        included[i] = false;
                    }
                }
            }
        }
    }

    (best_included, best_value)
}

fn singleton(coin: InputCoin) -> BTreeSet<InputCoin> {
    let mut set = BTreeSet::new();
    set.insert(coin);
    set
}
