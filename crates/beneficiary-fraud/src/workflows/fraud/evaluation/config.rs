use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::super::domain::EligibilityType;

/// Age windows that define the eligibility tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub underage_min_age: u32,
    pub underage_max_age: u32,
    pub full_age: u32,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            underage_min_age: 15,
            underage_max_age: 17,
            full_age: 18,
        }
    }
}

impl EvaluationConfig {
    pub fn is_underage_age(&self, age: u32) -> bool {
        (self.underage_min_age..=self.underage_max_age).contains(&age)
    }

    pub fn eligibility_for(
        &self,
        birth_date: NaiveDate,
        at: NaiveDateTime,
    ) -> Option<EligibilityType> {
        let age = at.date().years_since(birth_date)?;
        if self.is_underage_age(age) {
            Some(EligibilityType::Underage)
        } else if age == self.full_age {
            Some(EligibilityType::Age18)
        } else {
            None
        }
    }
}
