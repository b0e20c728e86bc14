//! Plan validator.
//!
//! Every violation is collected rather than stopping at the first one.
//! Ids and versions made only of whitespace count as empty. Step kinds are
//! not checked here; an unknown or empty kind fails at execution with
//! `ADAPTER_NOT_FOUND`.
//! Dependencies must name a step declared earlier in the plan; this keeps
//! the executor's single pass sound and rules out cycles without a graph
//! search.

use crate::plan::Plan;
use std::collections::{HashMap, HashSet};
use tessera_core::CoreError;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Plan id is empty
    #[error("Plan id must not be empty")]
    EmptyPlanId,
    /// Plan version is empty
    #[error("Plan version must not be empty")]
    EmptyVersion,
    /// Step at an index has an empty id
    #[error("Step at index {index} has an empty id")]
    EmptyStepId {
        /// Position in the plan
        index: usize,
    },
    /// Two steps share an id
    #[error("Duplicate step id '{step}'")]
    DuplicateStep {
        /// Step id
        step: String,
    },
    /// Dependency names no step in the plan
    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    DanglingDependency {
        /// Step id
        step: String,
        /// Missing dependency id
        dependency: String,
    },
    /// Step depends on itself
    #[error("Step '{step}' depends on itself")]
    SelfDependency {
        /// Step id
        step: String,
    },
    /// Dependency is declared after its dependent
    #[error("Step '{step}' depends on '{dependency}', which is declared after it")]
    ForwardDependency {
        /// Step id
        step: String,
        /// Dependency id
        dependency: String,
    },
    /// Plan exceeds the configured step limit
    #[error("Plan has {count} steps, limit is {max}")]
    TooManySteps {
        /// Steps in the plan
        count: usize,
        /// Configured limit
        max: usize,
    },
}

impl From<ValidationError> for CoreError {
    fn from(err: ValidationError) -> Self {
        CoreError::Validation {
            field: "plan".to_string(),
            reason: err.to_string(),
        }
    }
}

/// Validator for plan structure
#[derive(Debug, Clone, Default)]
pub struct Validator {
    /// Maximum allowed steps (0 = no limit)
    pub max_steps: usize,
}

impl Validator {
    /// Create a validator with no step limit
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of steps
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Validate a plan
    ///
    /// # Errors
    ///
    /// Returns every violation found, in plan order
    pub fn validate(&self, plan: &Plan) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if is_blank(&plan.id) {
            errors.push(ValidationError::EmptyPlanId);
        }
        if is_blank(&plan.version) {
            errors.push(ValidationError::EmptyVersion);
        }
        if self.max_steps > 0 && plan.steps.len() > self.max_steps {
            errors.push(ValidationError::TooManySteps {
                count: plan.steps.len(),
                max: self.max_steps,
            });
        }

        // First declaration index of every id
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (index, step) in plan.steps.iter().enumerate() {
            positions.entry(step.id.as_str()).or_insert(index);
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for (index, step) in plan.steps.iter().enumerate() {
            if is_blank(&step.id) {
                errors.push(ValidationError::EmptyStepId { index });
            } else if !seen.insert(step.id.as_str()) {
                errors.push(ValidationError::DuplicateStep {
                    step: step.id.clone(),
                });
            }

            for dep in &step.depends_on {
                if *dep == step.id {
                    errors.push(ValidationError::SelfDependency {
                        step: step.id.clone(),
                    });
                    continue;
                }
                match positions.get(dep.as_str()) {
                    None => errors.push(ValidationError::DanglingDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    }),
                    Some(&at) if at > index => errors.push(ValidationError::ForwardDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    }),
                    Some(_) => {}
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Step;

    fn step(id: &str, deps: &[&str]) -> Step {
        let mut s = Step::new(id, "echo");
        s.depends_on = deps.iter().map(|d| d.to_string()).collect();
        s
    }

    fn plan(steps: Vec<Step>) -> Plan {
        let mut p = Plan::new("p", "1.0.0");
        p.steps = steps;
        p
    }

    #[test]
    fn test_valid_plan() {
        let p = plan(vec![step("a", &[]), step("b", &["a"]), step("c", &["a", "b"])]);
        assert!(Validator::new().validate(&p).is_ok());
    }

    #[test]
    fn test_empty_plan_is_valid() {
        assert!(plan(vec![]).validate().is_ok());
    }

    #[test]
    fn test_empty_ids() {
        let mut p = plan(vec![step("", &[])]);
        p.id = " ".to_string();
        p.version = String::new();
        let errors = p.validate().unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyPlanId,
                ValidationError::EmptyVersion,
                ValidationError::EmptyStepId { index: 0 },
            ]
        );
    }

    #[test]
    fn test_whitespace_step_id_is_empty() {
        let errors = plan(vec![step("a", &[]), step("  ", &[])])
            .validate()
            .unwrap_err();
        assert_eq!(errors, vec![ValidationError::EmptyStepId { index: 1 }]);
    }

    #[test]
    fn test_empty_kind_left_to_executor() {
        let mut s = step("a", &[]);
        s.kind = String::new();
        assert!(plan(vec![s]).validate().is_ok());
    }

    #[test]
    fn test_duplicate_step() {
        let errors = plan(vec![step("a", &[]), step("a", &[])]).validate().unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateStep {
                step: "a".to_string()
            }]
        );
    }

    #[test]
    fn test_dangling_dependency() {
        let errors = plan(vec![step("a", &["ghost"])]).validate().unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DanglingDependency {
                step: "a".to_string(),
                dependency: "ghost".to_string()
            }]
        );
    }

    #[test]
    fn test_self_dependency() {
        let errors = plan(vec![step("a", &["a"])]).validate().unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::SelfDependency {
                step: "a".to_string()
            }]
        );
    }

    #[test]
    fn test_forward_dependency_and_cycle() {
        let errors = plan(vec![step("a", &["b"]), step("b", &["a"])])
            .validate()
            .unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::ForwardDependency {
                step: "a".to_string(),
                dependency: "b".to_string()
            }]
        );
    }

    #[test]
    fn test_collects_all_errors() {
        let errors = plan(vec![step("a", &["x"]), step("b", &["y", "b"])])
            .validate()
            .unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_max_steps() {
        let p = plan(vec![step("a", &[]), step("b", &[])]);
        let errors = Validator::new().with_max_steps(1).validate(&p).unwrap_err();
        assert_eq!(errors, vec![ValidationError::TooManySteps { count: 2, max: 1 }]);
        assert!(Validator::new().with_max_steps(2).validate(&p).is_ok());
    }

    #[test]
    fn test_into_core_error() {
        let err: CoreError = ValidationError::EmptyPlanId.into();
        assert!(err.to_string().contains("Plan id must not be empty"));
    }
}
