//! Side-effect-free planning reports for `goap explain`.

use serde::Serialize;

use crate::core::catalog::ActionCatalog;
use crate::core::goal::GoalSpec;
use crate::core::planner::{BottleneckReport, Plan, Planner, SearchLimits};
use crate::core::state::WorldState;

/// Plan for a goal, or the reason there is none.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Explanation {
    Plan { plan: Plan },
    Exhausted { report: BottleneckReport },
}

impl Explanation {
    pub fn is_plan(&self) -> bool {
        matches!(self, Explanation::Plan { .. })
    }

    /// Human-readable rendering, one fact per line.
    pub fn render(&self) -> String {
        match self {
            Explanation::Plan { plan } => plan.to_string(),
            Explanation::Exhausted { report } => {
                let mut out = format!("{report}\n");
                if !report.unreached_keys.is_empty() {
                    out.push_str("unreached:\n");
                    for key in &report.unreached_keys {
                        out.push_str(&format!("  - {key}\n"));
                    }
                }
                if let Some(blocked) = &report.blocked_action {
                    out.push_str(&format!("nearest blocked action: {}\n", blocked.action));
                    for pre in &blocked.unmet {
                        let found = pre
                            .found
                            .as_ref()
                            .map_or_else(|| "missing".to_string(), ToString::to_string);
                        out.push_str(&format!("  - {} = {} (found {found})\n", pre.key, pre.required));
                    }
                }
                out
            }
        }
    }
}

/// Plan `goal` from `state` over `catalog`. Never executes anything.
pub fn explain_plan(
    catalog: &ActionCatalog,
    goal: &GoalSpec,
    state: &WorldState,
    limits: SearchLimits,
) -> Explanation {
    match Planner::new(catalog, limits).plan(state, goal) {
        Ok(plan) => Explanation::Plan { plan },
        Err(exhausted) => Explanation::Exhausted {
            report: exhausted.report,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::ActionDefinition;
    use crate::core::state::StateKey;

    fn catalog() -> ActionCatalog {
        ActionCatalog::from_actions([
            ActionDefinition::builder("move")
                .cost(1)
                .effect(StateKey::AtTarget, true)
                .build()
                .expect("move"),
            ActionDefinition::builder("gather")
                .cost(2)
                .pre(StateKey::AtTarget, true)
                .effect(StateKey::HasItem, true)
                .build()
                .expect("gather"),
        ])
        .expect("catalog")
    }

    #[test]
    fn explains_a_plan() {
        let state = crate::world_state! { AtTarget => false, HasItem => false }.expect("state");
        let goal = GoalSpec::new("get_item", crate::world_state! { HasItem => true }.expect("goal"));

        let explanation = explain_plan(&catalog(), &goal, &state, SearchLimits::default());
        assert!(explanation.is_plan());
        let text = explanation.render();
        assert!(text.contains("1. move (cost 1)"));
        assert!(text.contains("2. gather (cost 2)"));

        let json = serde_json::to_value(&explanation).expect("json");
        assert_eq!(json["status"], "plan");
        assert_eq!(json["plan"]["total_cost"], 3);
    }

    #[test]
    fn explains_an_unreachable_goal() {
        let state = crate::world_state! { AtTarget => false }.expect("state");
        let goal = GoalSpec::new("craft", crate::world_state! { HasCraftedItem => true }.expect("goal"));

        let explanation = explain_plan(&catalog(), &goal, &state, SearchLimits::default());
        assert!(!explanation.is_plan());
        assert!(explanation.render().contains("  - has_crafted_item"));

        let json = serde_json::to_value(&explanation).expect("json");
        assert_eq!(json["status"], "exhausted");
        assert_eq!(json["report"]["unreached_keys"][0], "has_crafted_item");
    }
}
