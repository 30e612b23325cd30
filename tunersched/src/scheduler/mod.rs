//! Scheduled task management for tunersched.
//!
//! This module provides:
//! - [`PeriodicEvaluator`]: periodic evaluation and persistence of the schedule
//! - [`RuleRegistry`]: read/write-guarded access to schedule rules

pub mod evaluator;
pub mod rules;

pub use evaluator::{EvaluatorConfig, EvaluatorError, PassOutcome, PeriodicEvaluator};
pub use rules::RuleRegistry;
