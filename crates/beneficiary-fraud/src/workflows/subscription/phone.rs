//! Phone number validation by SMS code, with its rate limits and fraud rules.

use std::sync::OnceLock;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use rand::Rng;
use regex::Regex;
use tracing::{info, warn};

use super::messages::NotificationPublisher;
use super::service::{SubscriptionError, SubscriptionService};
use crate::workflows::fraud::{
    EntityKey, FraudRepository, PhoneFraudSource, PhoneValidationContent, PhoneValidationStatus,
    PhoneValidationToken, SaveBatch, User, UserId,
};

const E164_PATTERN: &str = r"^\+\d{8,15}$";
const DEFAULT_COUNTRY_PREFIX: &str = "+33";

/// Windowed counter. The window starts with the first increment of a key.
pub trait AttemptCounter: Send + Sync {
    fn count(&self, key: &str) -> Result<u32, CounterError>;

    /// Increments atomically and returns the new value.
    fn increment(&self, key: &str, ttl: Duration) -> Result<u32, CounterError>;
}

pub trait SmsSender: Send + Sync {
    fn send(&self, phone_number: &str, message: &str) -> Result<(), SmsError>;
}

#[derive(Debug, thiserror::Error)]
#[error("attempt counter unavailable: {0}")]
pub struct CounterError(pub String);

#[derive(Debug, thiserror::Error)]
#[error("sms provider error: {0}")]
pub struct SmsError(pub String);

/// International number whose country code is allowed to receive codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPhoneNumber {
    pub country_code: u16,
    pub number: String,
}

fn e164_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(E164_PATTERN).ok()).as_ref()
}

/// Normalizes `raw` to `+<digits>`. National numbers starting with `0` are read as French.
pub fn parse_phone_number(
    raw: &str,
    country_codes: &[u16],
) -> Result<ParsedPhoneNumber, PhoneValidationError> {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '.' | '-' | '(' | ')'))
        .collect();

    let number = if let Some(rest) = compact.strip_prefix("00") {
        format!("+{rest}")
    } else if compact.len() == 10 && compact.starts_with('0') {
        format!("{DEFAULT_COUNTRY_PREFIX}{}", &compact[1..])
    } else {
        compact
    };

    let valid = e164_regex()
        .map(|pattern| pattern.is_match(&number))
        .unwrap_or(false);
    if !valid {
        return Err(PhoneValidationError::InvalidPhoneNumber(raw.to_string()));
    }

    let digits = &number[1..];
    let country_code = country_codes
        .iter()
        .copied()
        .filter(|code| digits.starts_with(&code.to_string()))
        .max_by_key(|code| code.to_string().len())
        .ok_or_else(|| PhoneValidationError::InvalidCountryCode(number.clone()))?;

    Ok(ParsedPhoneNumber {
        country_code,
        number,
    })
}

fn attempts_key(user_id: UserId) -> String {
    format!("phone_validation_attempts_user_{user_id}")
}

fn sent_sms_key(user_id: UserId) -> String {
    format!("sent_sms_user_{user_id}")
}

fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// Refusal that is recorded as a KO phone validation fraud check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhoneFraudFailure {
    #[error("phone number {phone_number} is blacklisted")]
    Blacklisted { phone_number: String },
    #[error("phone number {phone_number} is already used by another account")]
    PhoneAlreadyExists { phone_number: String },
    #[error("too many validation codes sent")]
    SmsSendingLimitReached,
    #[error("too many validation attempts ({attempts})")]
    AttemptsLimitReached { attempts: u32 },
}

impl PhoneFraudFailure {
    pub fn source(&self) -> PhoneFraudSource {
        match self {
            Self::Blacklisted { .. } => PhoneFraudSource::BlacklistedPhoneNumber,
            Self::PhoneAlreadyExists { .. } => PhoneFraudSource::PhoneAlreadyExists,
            Self::SmsSendingLimitReached => PhoneFraudSource::SmsSendingLimitReached,
            Self::AttemptsLimitReached { .. } => {
                PhoneFraudSource::PhoneValidationAttemptsLimitReached
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PhoneValidationError {
    #[error("phone number is already validated")]
    AlreadyValidated,
    #[error("email address must be validated first")]
    EmailNotValidated,
    #[error("user is already a beneficiary")]
    AlreadyBeneficiary,
    #[error("no phone number to validate")]
    MissingPhoneNumber,
    #[error("phone number {0} is not valid")]
    InvalidPhoneNumber(String),
    #[error("phone number {0} has a country code that is not allowed")]
    InvalidCountryCode(String),
    #[error(transparent)]
    Fraud(#[from] PhoneFraudFailure),
    #[error("validation code is not valid, {remaining_attempts} attempt(s) left")]
    NotValidCode { remaining_attempts: u32 },
    #[error("validation code has expired")]
    ExpiredCode,
    #[error("validation code could not be sent")]
    SendingFailed(#[source] SmsError),
    #[error(transparent)]
    Counter(#[from] CounterError),
}

impl<R, N> SubscriptionService<R, N>
where
    R: FraudRepository + 'static,
    N: NotificationPublisher + 'static,
{
    /// Sends a fresh code to `phone_number`, or to the number already on the account.
    pub fn send_phone_validation_code(
        &self,
        user_id: UserId,
        phone_number: Option<&str>,
    ) -> Result<(), SubscriptionError> {
        let mut user = self.load_user(user_id)?;
        ensure_can_validate_phone(&user)?;

        let raw = phone_number
            .map(str::to_string)
            .or_else(|| user.phone_number.clone())
            .ok_or(PhoneValidationError::MissingPhoneNumber)?;
        let parsed = self.parse_phone_number(&raw)?;

        self.check_phone_number_is_legit(&user, &parsed.number)?;
        self.check_phone_number_not_used(&user, &parsed.number)?;

        let settings = &self.settings.phone_validation;
        let sent = self.ports.counters.count(&sent_sms_key(user.id))?;
        if sent >= settings.max_sms_sent {
            return Err(self.reject_phone_number(
                user,
                Some(parsed.number),
                PhoneFraudFailure::SmsSendingLimitReached,
            ));
        }

        let code = generate_code();
        let token = PhoneValidationToken {
            user_id: user.id,
            value: code.clone(),
            expiration_date: self.now() + ChronoDuration::minutes(settings.code_lifetime_minutes),
        };
        user.phone_number = Some(parsed.number.clone());
        self.save(
            SaveBatch::new()
                .user(user.clone())
                .phone_validation_token(token),
        )?;

        let message = format!("{code} is your confirmation code");
        if let Err(err) = self.ports.sms.send(&parsed.number, &message) {
            warn!(user_id = %user.id, error = %err, "validation code could not be sent");
            return Err(PhoneValidationError::SendingFailed(err).into());
        }

        let sent = self
            .ports
            .counters
            .increment(&sent_sms_key(user.id), settings.sms_sending_ttl)?;
        info!(user_id = %user.id, sent, "phone validation code sent");
        Ok(())
    }

    /// Checks `code` against the pending token and marks the phone as validated.
    pub fn validate_phone_number(
        &self,
        user_id: UserId,
        code: &str,
    ) -> Result<User, SubscriptionError> {
        let mut user = self.load_user(user_id)?;
        ensure_can_validate_phone(&user)?;

        let phone_number = user
            .phone_number
            .clone()
            .ok_or(PhoneValidationError::MissingPhoneNumber)?;
        self.check_phone_number_is_legit(&user, &phone_number)?;
        let attempts = self.check_and_update_attempts(&user)?;

        let remaining_attempts = self
            .settings
            .phone_validation
            .max_validation_attempts
            .saturating_sub(attempts);
        let token = self
            .fraud()
            .repository()
            .phone_validation_token(user.id)?
            .filter(|token| token.value == code)
            .ok_or(PhoneValidationError::NotValidCode { remaining_attempts })?;
        if token.expiration_date < self.now() {
            return Err(PhoneValidationError::ExpiredCode.into());
        }

        self.check_phone_number_not_used(&user, &phone_number)?;

        user.phone_validation_status = PhoneValidationStatus::Validated;
        self.save(
            SaveBatch::new()
                .user(user.clone())
                .delete(EntityKey::PhoneValidationToken(user.id)),
        )?;
        info!(user_id = %user.id, "phone number validated");
        Ok(user)
    }

    pub fn validate_phone_number_and_activate_user(
        &self,
        user_id: UserId,
        code: &str,
    ) -> Result<Option<User>, SubscriptionError> {
        self.validate_phone_number(user_id, code)?;
        self.activate_if_possible(user_id, "phone_validation")
    }

    /// Replaces the number on the account and invalidates any pending code.
    pub fn change_phone_number(
        &self,
        user_id: UserId,
        phone_number: &str,
    ) -> Result<User, SubscriptionError> {
        let mut user = self.load_user(user_id)?;
        ensure_can_validate_phone(&user)?;

        let parsed = self.parse_phone_number(phone_number)?;
        self.check_phone_number_is_legit(&user, &parsed.number)?;
        self.check_phone_number_not_used(&user, &parsed.number)?;

        user.phone_number = Some(parsed.number);
        self.save(
            SaveBatch::new()
                .user(user.clone())
                .delete(EntityKey::PhoneValidationToken(user.id)),
        )?;
        info!(user_id = %user.id, "phone number changed");
        Ok(user)
    }

    fn parse_phone_number(&self, raw: &str) -> Result<ParsedPhoneNumber, PhoneValidationError> {
        parse_phone_number(raw, &self.settings.phone_validation.whitelisted_country_codes)
    }

    fn check_phone_number_is_legit(
        &self,
        user: &User,
        phone_number: &str,
    ) -> Result<(), SubscriptionError> {
        let blacklisted = self
            .settings
            .phone_validation
            .blacklisted_numbers
            .iter()
            .any(|number| number == phone_number);
        if blacklisted {
            return Err(self.reject_phone_number(
                user.clone(),
                Some(phone_number.to_string()),
                PhoneFraudFailure::Blacklisted {
                    phone_number: phone_number.to_string(),
                },
            ));
        }

        self.parse_phone_number(phone_number)?;
        Ok(())
    }

    fn check_phone_number_not_used(
        &self,
        user: &User,
        phone_number: &str,
    ) -> Result<(), SubscriptionError> {
        let owner = self
            .fraud()
            .repository()
            .find_validated_phone_owner(phone_number)?;
        match owner {
            Some(owner) if owner != user.id => Err(self.reject_phone_number(
                user.clone(),
                Some(phone_number.to_string()),
                PhoneFraudFailure::PhoneAlreadyExists {
                    phone_number: phone_number.to_string(),
                },
            )),
            _ => Ok(()),
        }
    }

    /// Counts this attempt, refusing it once the window's maximum is exceeded.
    ///
    /// The counter is incremented before the comparison so concurrent attempts each get
    /// their own position in the window.
    fn check_and_update_attempts(&self, user: &User) -> Result<u32, SubscriptionError> {
        let settings = &self.settings.phone_validation;
        let attempts = self
            .ports
            .counters
            .increment(&attempts_key(user.id), settings.validation_attempts_ttl)?;
        if attempts > settings.max_validation_attempts {
            return Err(self.reject_phone_number(
                user.clone(),
                user.phone_number.clone(),
                PhoneFraudFailure::AttemptsLimitReached {
                    attempts: attempts - 1,
                },
            ));
        }

        Ok(attempts)
    }

    /// Records the refusal as a KO check and returns the error to propagate.
    fn reject_phone_number(
        &self,
        mut user: User,
        phone_number: Option<String>,
        failure: PhoneFraudFailure,
    ) -> SubscriptionError {
        let content = PhoneValidationContent {
            source: failure.source(),
            message: failure.to_string(),
            phone_number,
        };
        if let Err(err) = self.fraud().record_failed_phone_validation(&user, content) {
            return err.into();
        }

        if matches!(failure, PhoneFraudFailure::AttemptsLimitReached { .. }) {
            user.phone_validation_status =
                PhoneValidationStatus::BlockedTooManyCodeVerificationTries;
            if let Err(err) = self.save(SaveBatch::new().user(user)) {
                return err;
            }
        }

        PhoneValidationError::Fraud(failure).into()
    }
}

fn ensure_can_validate_phone(user: &User) -> Result<(), PhoneValidationError> {
    if user.is_phone_validated() {
        return Err(PhoneValidationError::AlreadyValidated);
    }
    if !user.is_email_validated {
        return Err(PhoneValidationError::EmailNotValidated);
    }
    if user.is_beneficiary() {
        return Err(PhoneValidationError::AlreadyBeneficiary);
    }
    Ok(())
}
