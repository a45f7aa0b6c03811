//! Event replay: fold an ordered order-event log into the set of orders
//! still outstanding.
//!
//! ```text
//!   log text ──► format::parse_log ──► Vec<OrderEvent>
//!                                           │
//!                                           ▼  replay_events (pure fold)
//!                              BTreeMap<log order id, LiveOrder>
//! ```
//!
//! The fold is order-dependent and line position is the only ordering key:
//! a New inserts (overwriting any prior record under the same id), a Cancel
//! removes, a PartialFill decrements and removes on exhaustion. No event
//! ever errors against the working state — unknown ids are no-ops.

pub mod format;

pub use format::{parse_log, ReplayError};

use std::collections::BTreeMap;

use crate::models::{EventKind, LiveOrder, OrderEvent};

/// Working state and final result of a replay, keyed by the source log's
/// order id. Ordered so a given log always folds to identical output.
pub type ReplayState = BTreeMap<String, LiveOrder>;

/// Apply one event to the working state.
///
/// `remaining_qty > 0` is an invariant of the state: any transition that
/// would leave a record at zero or below removes the record instead.
pub fn apply_event(state: &mut ReplayState, event: OrderEvent) {
    match event.kind {
        EventKind::New => {
            // Last New under an id wins; a New that cannot rest (non-positive
            // quantity) still displaces whatever it overwrote.
            if event.quantity > 0 {
                state.insert(
                    event.order_id,
                    LiveOrder {
                        instrument: event.instrument,
                        side: event.side,
                        price: event.price,
                        remaining_qty: event.quantity,
                        timestamp: event.event_time,
                    },
                );
            } else {
                state.remove(&event.order_id);
            }
        }
        EventKind::Cancel => {
            state.remove(&event.order_id);
        }
        EventKind::PartialFill => {
            if let Some(order) = state.get_mut(&event.order_id) {
                order.remaining_qty -= event.quantity;
                if order.remaining_qty <= 0 {
                    state.remove(&event.order_id);
                }
            }
        }
    }
}

/// Fold a full event sequence into live orders. Pure: the result depends
/// only on the events and their order.
pub fn replay_events(events: impl IntoIterator<Item = OrderEvent>) -> ReplayState {
    let mut state = ReplayState::new();
    for event in events {
        apply_event(&mut state, event);
    }
    state
}

/// Parse and fold a whole log in one pass.
pub fn replay_log(input: &str) -> Result<ReplayState, ReplayError> {
    let events = format::parse_log(input)?;
    Ok(replay_events(events))
}
