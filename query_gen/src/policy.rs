//! Runtime policy for controlling generation probabilities and limits.
//!
//! Every random decision the generator and assembler make is driven by a
//! field of [`Policy`], so tests can pin a decision by setting its
//! probability to 0 or 1.

use crate::error::GenError;

/// Runtime policy controlling generation probabilities and limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    /// Maximum recursion depth for expressions.
    pub max_expr_depth: usize,

    /// Probability of stopping early and emitting a leaf.
    pub leaf_probability: f64,

    /// Probability that a leaf ignores the requested type.
    pub wrong_type_probability: f64,

    /// Probability of generating NULL literal [0.0, 1.0].
    pub null_probability: f64,

    /// Probability of dropping FUNC-category candidates for a node.
    pub drop_function_probability: f64,

    /// Probability of keeping only aggregates for a numeric node when
    /// aggregates are enabled.
    pub aggregate_only_probability: f64,

    /// Probability of replacing arguments with random ones when arity
    /// fuzzing is enabled.
    pub fuzz_arity_probability: f64,

    /// Maximum number of arguments for variadic calls.
    pub max_variadic_args: usize,

    /// Maximum number of tables in FROM/JOIN.
    pub max_tables: usize,

    /// Probability of emitting a comma-separated table list instead of joins.
    pub implicit_from_probability: f64,

    /// Probability of breaking the ON-clause rule of a join.
    pub join_rule_violation_probability: f64,

    /// Probability of giving every joined table a positional alias.
    pub table_alias_probability: f64,

    /// Probability of emitting `SELECT ALL`.
    pub select_all_probability: f64,

    /// Probability of wrapping an ORDER BY expression in an ordering term.
    pub ordering_term_probability: f64,

    /// Probability of a window expression carrying a frame clause.
    pub window_frame_probability: f64,

    /// Probability that a PARTITION BY item is a bare column.
    pub partition_column_probability: f64,

    /// Probability of an unusual frame bound: a negative offset, or
    /// UNBOUNDED PRECEDING as the frame end.
    pub frame_chaos_probability: f64,

    /// Maximum number of ORDER BY / GROUP BY / aggregate expressions.
    pub max_list_size: usize,

    /// Probability that a TLP-WHERE query is grouped by its fetch list.
    pub tlp_group_by_probability: f64,

    /// Probability that a crash-oracle query is turned into a grouped
    /// aggregate query.
    pub grouped_aggregate_probability: f64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_expr_depth: 3,
            leaf_probability: 0.5,
            wrong_type_probability: 0.1,
            null_probability: 0.02,
            drop_function_probability: 0.5,
            aggregate_only_probability: 0.5,
            fuzz_arity_probability: 0.01,
            max_variadic_args: 5,
            max_tables: 3,
            implicit_from_probability: 0.25,
            join_rule_violation_probability: 0.01,
            table_alias_probability: 1.0,
            select_all_probability: 0.1,
            ordering_term_probability: 0.5,
            window_frame_probability: 0.5,
            partition_column_probability: 0.8,
            frame_chaos_probability: 0.1,
            max_list_size: 3,
            tlp_group_by_probability: 0.25,
            grouped_aggregate_probability: 0.9,
        }
    }
}

impl Policy {
    /// Create a new policy with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy with no random type confusion or NULL leaves.
    ///
    /// Useful in tests that inspect the static type of generated trees.
    pub fn well_typed() -> Self {
        Self {
            wrong_type_probability: 0.0,
            null_probability: 0.0,
            join_rule_violation_probability: 0.0,
            ..Self::default()
        }
    }

    /// Builder method to set max expression depth.
    pub fn with_max_expr_depth(mut self, depth: usize) -> Self {
        self.max_expr_depth = depth;
        self
    }

    /// Builder method to set max tables.
    pub fn with_max_tables(mut self, tables: usize) -> Self {
        self.max_tables = tables;
        self
    }

    /// Builder method to set leaf probability.
    pub fn with_leaf_probability(mut self, prob: f64) -> Self {
        self.leaf_probability = prob.clamp(0.0, 1.0);
        self
    }

    /// Builder method to set wrong-type probability.
    pub fn with_wrong_type_probability(mut self, prob: f64) -> Self {
        self.wrong_type_probability = prob.clamp(0.0, 1.0);
        self
    }

    /// Builder method to set null probability.
    pub fn with_null_probability(mut self, prob: f64) -> Self {
        self.null_probability = prob.clamp(0.0, 1.0);
        self
    }

    /// Builder method to set the function-dropping probability.
    pub fn with_drop_function_probability(mut self, prob: f64) -> Self {
        self.drop_function_probability = prob.clamp(0.0, 1.0);
        self
    }

    /// Builder method to set the implicit FROM probability.
    pub fn with_implicit_from_probability(mut self, prob: f64) -> Self {
        self.implicit_from_probability = prob.clamp(0.0, 1.0);
        self
    }

    /// Builder method to set the join rule violation probability.
    pub fn with_join_rule_violation_probability(mut self, prob: f64) -> Self {
        self.join_rule_violation_probability = prob.clamp(0.0, 1.0);
        self
    }

    /// Builder method to set the table alias probability.
    pub fn with_table_alias_probability(mut self, prob: f64) -> Self {
        self.table_alias_probability = prob.clamp(0.0, 1.0);
        self
    }

    /// Builder method to set the TLP-WHERE grouping probability.
    pub fn with_tlp_group_by_probability(mut self, prob: f64) -> Self {
        self.tlp_group_by_probability = prob.clamp(0.0, 1.0);
        self
    }

    /// Builder method to set the grouped aggregate probability.
    pub fn with_grouped_aggregate_probability(mut self, prob: f64) -> Self {
        self.grouped_aggregate_probability = prob.clamp(0.0, 1.0);
        self
    }

    /// Builder method to set the arity fuzzing probability.
    pub fn with_fuzz_arity_probability(mut self, prob: f64) -> Self {
        self.fuzz_arity_probability = prob.clamp(0.0, 1.0);
        self
    }

    /// Check that limits are usable and every probability is in [0, 1].
    pub fn validate(&self) -> Result<(), GenError> {
        if self.max_tables == 0 {
            return Err(GenError::invalid_config("max_tables must be at least 1"));
        }
        if self.max_list_size == 0 {
            return Err(GenError::invalid_config("max_list_size must be at least 1"));
        }
        let probabilities = [
            ("leaf_probability", self.leaf_probability),
            ("wrong_type_probability", self.wrong_type_probability),
            ("null_probability", self.null_probability),
            ("drop_function_probability", self.drop_function_probability),
            ("aggregate_only_probability", self.aggregate_only_probability),
            ("fuzz_arity_probability", self.fuzz_arity_probability),
            ("implicit_from_probability", self.implicit_from_probability),
            (
                "join_rule_violation_probability",
                self.join_rule_violation_probability,
            ),
            ("table_alias_probability", self.table_alias_probability),
            ("select_all_probability", self.select_all_probability),
            ("ordering_term_probability", self.ordering_term_probability),
            ("window_frame_probability", self.window_frame_probability),
            (
                "partition_column_probability",
                self.partition_column_probability,
            ),
            ("frame_chaos_probability", self.frame_chaos_probability),
            ("tlp_group_by_probability", self.tlp_group_by_probability),
            (
                "grouped_aggregate_probability",
                self.grouped_aggregate_probability,
            ),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(GenError::invalid_config(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }
}
