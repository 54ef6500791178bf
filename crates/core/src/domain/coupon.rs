use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::UserId;
use crate::domain::{optional_text, required_text};
use crate::errors::DomainError;
use crate::money::Money;
use crate::pagination::CursorKey;

/// Suffix alphabet without look-alike characters (no I, O, 0, 1).
const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_SUFFIX_LEN: usize = 6;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CouponCode(pub String);

impl CouponCode {
    /// `CPN-YYYYMMDD-XXXXXX`.
    pub fn generate<R: Rng + ?Sized>(issued_on: NaiveDate, rng: &mut R) -> Self {
        let suffix: String = (0..CODE_SUFFIX_LEN)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        Self(format!("CPN-{}-{suffix}", issued_on.format("%Y%m%d")))
    }

    /// Codes are shared by humans; lookups are case-insensitive.
    pub fn normalize(raw: &str) -> Result<Self, DomainError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(DomainError::validation("code", "is required"));
        }
        Ok(Self(code))
    }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponStatus {
    Active,
    Used,
    Expired,
}

impl CouponStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Used => "USED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "USED" => Ok(Self::Used),
            "EXPIRED" => Ok(Self::Expired),
            other => {
                Err(DomainError::validation("status", format!("unknown coupon status `{other}`")))
            }
        }
    }
}

impl fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponDraft {
    pub customer_name: String,
    pub server: Option<String>,
    pub category: Option<String>,
    pub reason: Option<String>,
    pub zelle_name: Option<String>,
    pub amount: Money,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub code: CouponCode,
    pub customer_name: String,
    pub server: Option<String>,
    pub category: Option<String>,
    pub reason: Option<String>,
    pub zelle_name: Option<String>,
    pub amount: Money,
    pub remaining_balance: Money,
    pub issued_by: UserId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: CouponStatus,
    pub used_by: Option<UserId>,
    pub used_by_name: Option<String>,
    pub used_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

/// Write-once audit of a balance clearing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponClearRecord {
    pub id: String,
    pub coupon_code: CouponCode,
    pub cleared_at: DateTime<Utc>,
    pub cleared_by: UserId,
    pub cleared_by_name: String,
    pub cleared_amount: Money,
}

impl CursorKey for CouponClearRecord {
    fn cursor_timestamp(&self) -> DateTime<Utc> {
        self.cleared_at
    }

    fn cursor_id(&self) -> &str {
        &self.id
    }
}

impl Coupon {
    /// Validates a draft before any code is allocated.
    pub fn validate_draft(draft: &CouponDraft) -> Result<(), DomainError> {
        required_text("customerName", &draft.customer_name)?;
        draft.amount.require_positive("amount")?;
        Ok(())
    }

    pub fn issue(
        code: CouponCode,
        issued_by: UserId,
        draft: CouponDraft,
        validity: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let amount = draft.amount.require_positive("amount")?;
        Ok(Self {
            code,
            customer_name: required_text("customerName", &draft.customer_name)?,
            server: optional_text(draft.server),
            category: optional_text(draft.category),
            reason: optional_text(draft.reason),
            zelle_name: optional_text(draft.zelle_name),
            amount,
            remaining_balance: amount,
            issued_by,
            issued_at: now,
            expires_at: now + validity,
            status: CouponStatus::Active,
            used_by: None,
            used_by_name: None,
            used_at: None,
            updated_at: now,
            version: 0,
        })
    }

    /// Passive expiry. Returns true when the status changed.
    pub fn refresh_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == CouponStatus::Active && now > self.expires_at {
            self.status = CouponStatus::Expired;
            self.updated_at = now;
            return true;
        }
        false
    }

    /// Legacy full use.
    pub fn honor(
        &mut self,
        user: &UserId,
        user_name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.refresh_expiry(now);
        self.ensure_active()?;
        self.mark_used(user, user_name, now);
        Ok(())
    }

    pub fn clear(
        &mut self,
        user: &UserId,
        user_name: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<CouponClearRecord, DomainError> {
        self.refresh_expiry(now);
        self.ensure_active()?;
        let amount = amount.require_positive("amount")?;
        if amount != self.remaining_balance {
            return Err(DomainError::validation(
                "amount",
                format!("must equal the remaining balance of {} exactly", self.remaining_balance),
            ));
        }

        self.mark_used(user, user_name, now);
        Ok(CouponClearRecord {
            id: format!("cch-{}", Uuid::new_v4().simple()),
            coupon_code: self.code.clone(),
            cleared_at: now,
            cleared_by: user.clone(),
            cleared_by_name: user_name.to_string(),
            cleared_amount: amount,
        })
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        match self.status {
            CouponStatus::Active => Ok(()),
            CouponStatus::Expired => Err(DomainError::conflict(format!(
                "coupon {} expired on {}",
                self.code,
                self.expires_at.format("%Y-%m-%d")
            ))),
            CouponStatus::Used => {
                let who = self
                    .used_by_name
                    .clone()
                    .or_else(|| self.used_by.as_ref().map(|id| id.0.clone()))
                    .unwrap_or_else(|| "another user".to_string());
                let when = self
                    .used_at
                    .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "an earlier date".to_string());
                Err(DomainError::conflict(format!(
                    "coupon {} was already used by {who} on {when}",
                    self.code
                )))
            }
        }
    }

    fn mark_used(&mut self, user: &UserId, user_name: &str, now: DateTime<Utc>) {
        self.remaining_balance = Money::ZERO;
        self.status = CouponStatus::Used;
        self.used_by = Some(user.clone());
        self.used_by_name = Some(user_name.to_string());
        self.used_at = Some(now);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{Coupon, CouponCode, CouponDraft, CouponStatus};
    use crate::domain::user::UserId;
    use crate::errors::DomainError;
    use crate::money::Money;

    fn coupon(amount_cents: i64) -> Coupon {
        Coupon::issue(
            CouponCode("CPN-20240115-ABCDEF".to_string()),
            UserId("emp-1".to_string()),
            CouponDraft {
                customer_name: "Avery".to_string(),
                amount: Money::from_cents(amount_cents),
                ..CouponDraft::default()
            },
            Duration::days(90),
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).single().expect("ts"),
        )
        .expect("coupon")
    }

    #[test]
    fn generated_codes_embed_the_issue_date() {
        let mut rng = StdRng::seed_from_u64(7);
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).expect("date");
        let code = CouponCode::generate(date, &mut rng);

        assert!(code.0.starts_with("CPN-20240115-"));
        let suffix = &code.0["CPN-20240115-".len()..];
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| !"IO01".contains(c)));
        assert_eq!(CouponCode::normalize(" cpn-20240115-abcdef ").expect("code").0, "CPN-20240115-ABCDEF");
    }

    #[test]
    fn issue_sets_balance_and_expiry() {
        let coupon = coupon(2_500);
        assert_eq!(coupon.remaining_balance, coupon.amount);
        assert_eq!(coupon.expires_at - coupon.issued_at, Duration::days(90));
        assert_eq!(coupon.status, CouponStatus::Active);

        let error = Coupon::validate_draft(&CouponDraft {
            customer_name: "Avery".to_string(),
            amount: Money::ZERO,
            ..CouponDraft::default()
        })
        .expect_err("zero amount");
        assert!(matches!(error, DomainError::Validation { field: "amount", .. }));
    }

    #[test]
    fn second_honor_names_the_first_honorer() {
        let mut coupon = coupon(2_500);
        let at = coupon.issued_at + Duration::days(1);
        coupon.honor(&UserId("emp-2".to_string()), "Dana", at).expect("first honor");
        assert_eq!(coupon.status, CouponStatus::Used);
        assert_eq!(coupon.remaining_balance, Money::ZERO);

        let error = coupon.honor(&UserId("emp-3".to_string()), "Sam", at).expect_err("second");
        assert_eq!(
            error.to_string(),
            "coupon CPN-20240115-ABCDEF was already used by Dana on 2024-01-16 10:00 UTC"
        );
    }

    #[test]
    fn expiry_is_applied_lazily() {
        let mut coupon = coupon(2_500);
        assert!(!coupon.refresh_expiry(coupon.expires_at));
        assert!(coupon.refresh_expiry(coupon.expires_at + Duration::seconds(1)));
        assert_eq!(coupon.status, CouponStatus::Expired);

        let error = coupon
            .clear(&UserId("emp-2".to_string()), "Dana", Money::from_cents(2_500), Utc::now())
            .expect_err("expired");
        assert!(error.to_string().contains("expired on"));
    }

    #[test]
    fn clear_requires_exact_balance() {
        let mut coupon = coupon(2_500);
        let at = coupon.issued_at + Duration::hours(1);
        let user = UserId("emp-2".to_string());

        let error = coupon.clear(&user, "Dana", Money::from_cents(2_499), at).expect_err("mismatch");
        assert!(matches!(error, DomainError::Validation { field: "amount", .. }));
        assert_eq!(coupon.remaining_balance, Money::from_cents(2_500));

        let record = coupon
            .clear(&user, "Dana", Money::parse("amount", "25").expect("amount"), at)
            .expect("clear");
        assert_eq!(record.cleared_amount.to_string(), "25.00");
        assert_eq!(coupon.status, CouponStatus::Used);
        assert_eq!(coupon.remaining_balance, Money::ZERO);

        let error = coupon.clear(&user, "Dana", Money::from_cents(2_500), at).expect_err("used");
        assert!(error.to_string().contains("already used by Dana"));
    }
}
