use std::env;

/// Point-in-time view of the runtime switches consulted by the fraud workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureToggles {
    pub enable_ine_whitelist_filter: bool,
    pub force_phone_validation: bool,
    pub honor_statement_mandatory: bool,
    pub allow_empty_user_profiling: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            enable_ine_whitelist_filter: false,
            force_phone_validation: true,
            honor_statement_mandatory: false,
            allow_empty_user_profiling: false,
        }
    }
}

/// Source of feature toggles. Callers take one snapshot per evaluation so a toggle
/// flipped mid-request cannot produce a half-applied rule set.
pub trait FeatureToggleSource: Send + Sync {
    fn snapshot(&self) -> FeatureToggles;
}

impl FeatureToggleSource for FeatureToggles {
    fn snapshot(&self) -> FeatureToggles {
        *self
    }
}

/// Reads `FEATURE_*` variables every time a snapshot is taken.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvFeatureToggles;

impl FeatureToggleSource for EnvFeatureToggles {
    fn snapshot(&self) -> FeatureToggles {
        let defaults = FeatureToggles::default();
        FeatureToggles {
            enable_ine_whitelist_filter: flag(
                "FEATURE_ENABLE_INE_WHITELIST_FILTER",
                defaults.enable_ine_whitelist_filter,
            ),
            force_phone_validation: flag(
                "FEATURE_FORCE_PHONE_VALIDATION",
                defaults.force_phone_validation,
            ),
            honor_statement_mandatory: flag(
                "FEATURE_HONOR_STATEMENT_MANDATORY",
                defaults.honor_statement_mandatory,
            ),
            allow_empty_user_profiling: flag(
                "FEATURE_ALLOW_EMPTY_USER_PROFILING",
                defaults.allow_empty_user_profiling,
            ),
        }
    }
}

fn flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
