//! Build rule graph assembly: rule makers folded into a Makefile

pub mod error;
pub mod makefile;
pub mod rule;
pub mod rules;

pub use error::{BuildError, Result};
pub use makefile::{ALL_TARGET, DELETE_ON_ERROR, Makefile, RuleMaker, RuleMakers};
pub use rule::BuildRule;
pub use rules::{
    deps_target, graph_target, resolved_deps_target, standard_rule_makers, units_target,
};
