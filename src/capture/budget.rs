use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    Allow,
    Block(&'static str),
}

/// A wall-clock deadline for a protocol or a page.
#[derive(Debug, Clone)]
pub struct Budget {
    deadline: Instant,
    exhausted_reason: &'static str,
}

impl Budget {
    pub fn component(limit: Duration) -> Self {
        Self {
            deadline: Instant::now() + limit,
            exhausted_reason: "component_budget_exhausted",
        }
    }

    pub fn page(limit: Duration) -> Self {
        Self {
            deadline: Instant::now() + limit,
            exhausted_reason: "page_budget_exhausted",
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn check(&self) -> BudgetDecision {
        if self.remaining().is_zero() {
            BudgetDecision::Block(self.exhausted_reason)
        } else {
            BudgetDecision::Allow
        }
    }
}

/// The page budget is checked first: when it runs out the whole page is
/// finalized, not just the current component.
pub fn check_budgets(page: &Budget, component: &Budget) -> BudgetDecision {
    match page.check() {
        BudgetDecision::Allow => component.check(),
        blocked => blocked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_blocks_immediately() {
        let b = Budget::component(Duration::ZERO);
        assert_eq!(b.check(), BudgetDecision::Block("component_budget_exhausted"));
    }

    #[test]
    fn page_budget_takes_precedence() {
        let page = Budget::page(Duration::ZERO);
        let component = Budget::component(Duration::ZERO);
        assert_eq!(check_budgets(&page, &component), BudgetDecision::Block("page_budget_exhausted"));

        let page = Budget::page(Duration::from_secs(60));
        assert_eq!(check_budgets(&page, &component), BudgetDecision::Block("component_budget_exhausted"));
    }
}
