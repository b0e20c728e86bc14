//! Fluent construction of validated plans.

use crate::plan::{HookEvent, Hooks, Plan, Step, step_hook};
use crate::validate::{ValidationError, Validator};
use serde_json::Value;

/// Builder for a single step
#[derive(Debug, Clone)]
pub struct StepBuilder {
    step: Step,
}

impl StepBuilder {
    /// Start a step with an id and kind
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            step: Step::new(id, kind),
        }
    }

    /// Set the handler input
    #[must_use]
    pub fn input(mut self, input: Value) -> Self {
        self.step.input = input;
        self
    }

    /// Add a dependency
    #[must_use]
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.step.depends_on.push(id.into());
        self
    }

    /// Add several dependencies
    #[must_use]
    pub fn depends_on_all<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.step.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Declare a timeout
    #[must_use]
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.step.timeout_ms = Some(ms);
        self
    }

    /// Finish the step
    #[must_use]
    pub fn build(self) -> Step {
        self.step
    }
}

impl From<StepBuilder> for Step {
    fn from(builder: StepBuilder) -> Self {
        builder.build()
    }
}

/// Builder for a plan. Validation runs once, in [`PlanBuilder::build`].
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    plan: Plan,
    validator: Validator,
}

impl PlanBuilder {
    /// Start a plan
    #[must_use]
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            plan: Plan::new(id, version),
            validator: Validator::new(),
        }
    }

    /// Append a step
    #[must_use]
    pub fn step(mut self, step: impl Into<Step>) -> Self {
        self.plan.steps.push(step.into());
        self
    }

    /// Append several steps
    #[must_use]
    pub fn steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Step>,
    {
        self.plan.steps.extend(steps.into_iter().map(Into::into));
        self
    }

    /// Set the pre-step hook
    #[must_use]
    pub fn pre_step<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookEvent<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.plan.hooks.pre_step = Some(step_hook(hook));
        self
    }

    /// Set the post-step hook
    #[must_use]
    pub fn post_step<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookEvent<'_>) -> Result<(), String> + Send + Sync + 'static,
    {
        self.plan.hooks.post_step = Some(step_hook(hook));
        self
    }

    /// Replace both hooks
    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.plan.hooks = hooks;
        self
    }

    /// Use a custom validator
    #[must_use]
    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Validate and produce the plan
    ///
    /// # Errors
    ///
    /// Returns every validation error found
    pub fn build(self) -> Result<Plan, Vec<ValidationError>> {
        self.validator.validate(&self.plan)?;
        Ok(self.plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_plan() {
        let plan = PlanBuilder::new("publish", "2.0.0")
            .step(StepBuilder::new("draft", "echo").input(json!("text")))
            .step(
                StepBuilder::new("review", "length")
                    .depends_on("draft")
                    .timeout_ms(250),
            )
            .build()
            .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.step("review").unwrap().depends_on, vec!["draft"]);
        assert_eq!(plan.step("review").unwrap().timeout_ms, Some(250));
        assert!(plan.hooks.is_empty());
    }

    #[test]
    fn test_build_reports_errors() {
        let errors = PlanBuilder::new("", "1")
            .step(StepBuilder::new("a", "echo").depends_on("missing"))
            .build()
            .unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], ValidationError::EmptyPlanId);
    }

    #[test]
    fn test_steps_and_depends_on_all() {
        let plan = PlanBuilder::new("p", "1")
            .steps([StepBuilder::new("a", "echo"), StepBuilder::new("b", "echo")])
            .step(StepBuilder::new("c", "concat").depends_on_all(["a", "b"]))
            .build()
            .unwrap();
        assert_eq!(plan.step_ids(), vec!["a", "b", "c"]);
        assert_eq!(plan.steps[2].depends_on, vec!["a", "b"]);
    }

    #[test]
    fn test_hooks_attached() {
        let plan = PlanBuilder::new("p", "1")
            .pre_step(|_| Ok(()))
            .post_step(|event| Err(format!("saw {}", event.step.id)))
            .build()
            .unwrap();
        assert!(plan.hooks.pre_step.is_some());
        assert!(plan.hooks.post_step.is_some());
    }

    #[test]
    fn test_custom_validator() {
        let result = PlanBuilder::new("p", "1")
            .validator(Validator::new().with_max_steps(1))
            .steps([StepBuilder::new("a", "echo"), StepBuilder::new("b", "echo")])
            .build();
        assert!(result.is_err());
    }
}
