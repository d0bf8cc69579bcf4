//! Per-iteration and cumulative usage statistics.

/// Stats for a single loop iteration.
///
/// Created fresh for every iteration and folded into [`CumulativeStats`]
/// exactly once when the iteration completes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationStats {
    /// High-water mark of `input + cache_creation + cache_read` across turns.
    pub peak_context: u64,
    /// Cost reported by the terminal result event.
    pub cost: f64,
    /// Sum of sub-agent `totalTokens` across Task results.
    pub subagent_tokens: u64,
    /// Number of tool invocations.
    pub tool_calls: u64,
}

impl IterationStats {
    pub fn observe_context(&mut self, context_tokens: u64) {
        self.peak_context = self.peak_context.max(context_tokens);
    }

    pub fn observe_tool_use(&mut self) {
        self.tool_calls += 1;
    }

    pub fn observe_subagent(&mut self, total_tokens: u64) {
        self.subagent_tokens += total_tokens;
    }

    pub fn observe_result(&mut self, cost: f64) {
        self.cost = cost;
    }
}

/// Stats across all iterations of one loop run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CumulativeStats {
    pub iterations: u32,
    pub peak_context: u64,
    pub subagent_tokens: u64,
    pub total_cost: f64,
}

impl CumulativeStats {
    /// Merge a completed iteration into the totals.
    ///
    /// Not idempotent: folding the same iteration twice counts it twice.
    pub fn update(&mut self, iteration: &IterationStats) {
        self.iterations += 1;
        self.peak_context = self.peak_context.max(iteration.peak_context);
        self.subagent_tokens += iteration.subagent_tokens;
        self.total_cost += iteration.cost;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_context_is_a_high_water_mark() {
        let mut stats = IterationStats::default();
        stats.observe_context(500);
        stats.observe_context(120);
        stats.observe_context(700);
        stats.observe_context(10);
        assert_eq!(stats.peak_context, 700);
    }

    #[test]
    fn last_result_wins() {
        let mut stats = IterationStats::default();
        stats.observe_result(0.5);
        stats.observe_result(0.75);
        assert_eq!(stats.cost, 0.75);
    }

    #[test]
    fn cumulative_takes_max_context_and_sums_the_rest() {
        let mut cum = CumulativeStats::default();
        cum.update(&IterationStats {
            peak_context: 100,
            cost: 1.0,
            subagent_tokens: 10,
            tool_calls: 4,
        });
        cum.update(&IterationStats {
            peak_context: 50,
            cost: 2.5,
            subagent_tokens: 20,
            tool_calls: 1,
        });

        assert_eq!(cum.iterations, 2);
        assert_eq!(cum.peak_context, 100);
        assert_eq!(cum.subagent_tokens, 30);
        assert!((cum.total_cost - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn folding_twice_double_counts() {
        let iter = IterationStats {
            peak_context: 10,
            cost: 0.25,
            subagent_tokens: 5,
            tool_calls: 0,
        };
        let mut cum = CumulativeStats::default();
        cum.update(&iter);
        cum.update(&iter);
        assert_eq!(cum.iterations, 2);
        assert_eq!(cum.subagent_tokens, 10);
        assert_eq!(cum.total_cost, 0.5);
    }
}
