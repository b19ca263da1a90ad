//! Safety invariants observed state must satisfy.

use crate::core::state::{StateKey, WorldState};

/// Check invariants an observed state must never break:
/// - `hp >= 0`
/// - `hp <= max_hp`
/// - `item_count >= 0`
/// - `inventory_used <= inventory_max`
///
/// Keys absent from `state` are not checked.
pub fn validate_state_invariants(state: &WorldState) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(hp) = state.int(StateKey::Hp) {
        if hp < 0 {
            errors.push(format!("hp {hp} is negative"));
        }
        match state.int(StateKey::MaxHp) {
            Some(max_hp) if hp > max_hp => {
                errors.push(format!("hp {hp} exceeds max_hp {max_hp}"));
            }
            _ => {}
        }
    }

    match state.int(StateKey::ItemCount) {
        Some(count) if count < 0 => errors.push(format!("item_count {count} is negative")),
        _ => {}
    }

    match (
        state.int(StateKey::InventoryUsed),
        state.int(StateKey::InventoryMax),
    ) {
        (Some(used), Some(max)) if used > max => {
            errors.push(format!("inventory_used {used} exceeds inventory_max {max}"));
        }
        _ => {}
    }

    errors
}
