use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tracing::debug;

use super::StateCalculator;
use crate::error::CalcError;
use crate::models::{StateCode, StateTaxConfig};

/// Immutable map of `(state, tax year)` to calculator.
///
/// Built once at startup through [`StateRegistryBuilder`] and shared behind
/// an `Arc`; lookups are plain reads with no locking.
#[derive(Debug, Clone, Default)]
pub struct StateRegistry {
    calculators: HashMap<(StateCode, i32), StateCalculator>,
}

#[derive(Debug, Default)]
pub struct StateRegistryBuilder {
    calculators: HashMap<(StateCode, i32), StateCalculator>,
}

impl StateRegistryBuilder {
    /// Validates and registers one configuration.
    ///
    /// # Errors
    ///
    /// [`CalcError::Configuration`] if the configuration is invalid or the
    /// `(state, year)` pair is already registered.
    pub fn register(
        &mut self,
        config: StateTaxConfig,
    ) -> Result<&mut Self, CalcError> {
        config.validate()?;
        let key = (config.state_code, config.tax_year);
        match self.calculators.entry(key) {
            Entry::Occupied(_) => Err(CalcError::Configuration(format!(
                "{} {} registered twice",
                key.0, key.1
            ))),
            Entry::Vacant(slot) => {
                debug!(state = %key.0, tax_year = key.1, "registered state calculator");
                slot.insert(StateCalculator::new(Arc::new(config)));
                Ok(self)
            }
        }
    }

    pub fn register_all(
        &mut self,
        configs: impl IntoIterator<Item = StateTaxConfig>,
    ) -> Result<&mut Self, CalcError> {
        for config in configs {
            self.register(config)?;
        }
        Ok(self)
    }

    pub fn build(self) -> StateRegistry {
        StateRegistry {
            calculators: self.calculators,
        }
    }
}

impl StateRegistry {
    pub fn builder() -> StateRegistryBuilder {
        StateRegistryBuilder::default()
    }

    /// # Errors
    ///
    /// [`CalcError::UnsupportedJurisdiction`] for an unregistered pair.
    pub fn get(
        &self,
        state: StateCode,
        tax_year: i32,
    ) -> Result<&StateCalculator, CalcError> {
        self.calculators
            .get(&(state, tax_year))
            .ok_or_else(|| CalcError::UnsupportedJurisdiction {
                state: state.to_string(),
                tax_year,
            })
    }

    pub fn contains(
        &self,
        state: StateCode,
        tax_year: i32,
    ) -> bool {
        self.calculators.contains_key(&(state, tax_year))
    }

    /// Registered pairs in sorted order.
    pub fn jurisdictions(&self) -> Vec<(StateCode, i32)> {
        let mut keys: Vec<_> = self.calculators.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.calculators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calculators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_support::{flat_state_2025, state, state_registry};

    #[test]
    fn lookup_finds_registered_pair() {
        let registry = state_registry();

        let calculator = registry.get(state("ZF"), 2025).unwrap();

        assert_eq!(calculator.config().state_name, "Flatland");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn unregistered_year_is_unsupported() {
        let registry = state_registry();

        let err = registry.get(state("ZF"), 2024).unwrap_err();

        assert_eq!(
            err,
            CalcError::UnsupportedJurisdiction {
                state: "ZF".to_string(),
                tax_year: 2024
            }
        );
        assert!(err.is_client_error());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut builder = StateRegistry::builder();
        builder.register(flat_state_2025()).unwrap();

        let result = builder.register(flat_state_2025());

        assert!(matches!(result, Err(CalcError::Configuration(_))));
    }

    #[test]
    fn invalid_config_is_rejected_at_registration() {
        let mut config = flat_state_2025();
        config.is_flat_tax = false;

        assert!(StateRegistry::builder().register(config).is_err());
    }

    #[test]
    fn jurisdictions_are_sorted() {
        let registry = state_registry();

        assert_eq!(
            registry.jurisdictions(),
            vec![(state("TX"), 2025), (state("ZF"), 2025), (state("ZP"), 2025)]
        );
    }
}
