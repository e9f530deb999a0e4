//! Pre-save validation hooks.

use std::collections::HashMap;

use crate::entity::GraphEntity;

/// One problem found on an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Checks an entity before a save operation is queued.
pub trait Validator: Send + Sync {
    fn validate(&self, entity: &dyn GraphEntity) -> Result<(), Vec<ValidationIssue>>;
}

/// Accepts everything. The default when no validator is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _entity: &dyn GraphEntity) -> Result<(), Vec<ValidationIssue>> {
        Ok(())
    }
}

impl<F> Validator for F
where
    F: Fn(&dyn GraphEntity) -> Result<(), Vec<ValidationIssue>> + Send + Sync,
{
    fn validate(&self, entity: &dyn GraphEntity) -> Result<(), Vec<ValidationIssue>> {
        self(entity)
    }
}

/// Requires named properties to be present per discriminator.
#[derive(Debug, Clone, Default)]
pub struct RequiredProperties {
    required: HashMap<String, Vec<String>>,
}

impl RequiredProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require<I, S>(mut self, discriminator: &str, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required
            .entry(discriminator.to_string())
            .or_default()
            .extend(properties.into_iter().map(Into::into));
        self
    }
}

impl Validator for RequiredProperties {
    fn validate(&self, entity: &dyn GraphEntity) -> Result<(), Vec<ValidationIssue>> {
        let state = entity.state();
        let Some(required) = self.required.get(state.discriminator()) else {
            return Ok(());
        };

        let issues: Vec<ValidationIssue> = required
            .iter()
            .filter(|name| state.attribute(name).is_none())
            .map(|name| ValidationIssue::new(name.as_str(), "required", format!("{name} is required")))
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}
