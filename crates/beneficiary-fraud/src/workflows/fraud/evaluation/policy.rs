use serde::{Deserialize, Serialize};

use super::super::domain::{FraudCheckStatus, FraudItem, FraudReasonCode, FraudStatus};

pub const FRAUD_RESULT_REASON_SEPARATOR: &str = " ; ";

/// Check-level outcome merged from individual rule verdicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudVerdict {
    pub status: FraudCheckStatus,
    pub reason: String,
    pub reason_codes: Vec<FraudReasonCode>,
}

impl FraudVerdict {
    pub fn is_ok(&self) -> bool {
        self.status == FraudCheckStatus::Ok
    }
}

/// All OK gives OK, any KO gives KO, anything else is SUSPICIOUS.
pub fn aggregate(items: &[FraudItem]) -> FraudVerdict {
    let status = if items.iter().all(FraudItem::is_ok) {
        FraudCheckStatus::Ok
    } else if items.iter().any(|item| item.status == FraudStatus::Ko) {
        FraudCheckStatus::Ko
    } else {
        FraudCheckStatus::Suspicious
    };

    let failing = || items.iter().filter(|item| !item.is_ok());

    let reason = failing()
        .map(|item| item.detail.as_str())
        .collect::<Vec<_>>()
        .join(FRAUD_RESULT_REASON_SEPARATOR);
    let reason_codes = failing().filter_map(|item| item.reason_code).collect();

    FraudVerdict {
        status,
        reason,
        reason_codes,
    }
}
