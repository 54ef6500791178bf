use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info, warn};

use tally_core::domain::coupon::{Coupon, CouponClearRecord, CouponCode, CouponDraft};
use tally_core::errors::{ApplicationError, DomainError};
use tally_core::money::Money;
use tally_core::pagination::Page;
use tally_db::RepositoryError;

use super::{now, Caller, Workflows};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponHistoryRequest {
    pub code: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

impl Workflows {
    pub async fn generate_coupon(
        &self,
        caller: &Caller,
        draft: CouponDraft,
    ) -> Result<Coupon, ApplicationError> {
        self.generate_coupon_with(caller, draft, |day| {
            CouponCode::generate(day, &mut rand::thread_rng())
        })
        .await
    }

    /// Allocates a code from `next_code`, retrying collisions a bounded number of times.
    pub(crate) async fn generate_coupon_with<F>(
        &self,
        caller: &Caller,
        draft: CouponDraft,
        mut next_code: F,
    ) -> Result<Coupon, ApplicationError>
    where
        F: FnMut(NaiveDate) -> CouponCode + Send,
    {
        caller.account.ensure_active()?;
        Coupon::validate_draft(&draft)?;

        let attempts = self.settings.coupon_code_max_attempts.max(1);
        for attempt in 1..=attempts {
            let issued_at = now();
            let code = next_code(issued_at.date_naive());
            if self.repos.coupons.code_exists(&code).await? {
                debug!(
                    event_name = "coupons.code.collision",
                    correlation_id = %caller.correlation_id,
                    attempt,
                    "coupon code already taken; regenerating"
                );
                continue;
            }

            let coupon = Coupon::issue(
                code,
                caller.id().clone(),
                draft.clone(),
                self.settings.coupon_validity(),
                issued_at,
            )?;
            match self.repos.coupons.insert(coupon).await {
                Ok(saved) => {
                    info!(
                        event_name = "coupons.coupon.generated",
                        correlation_id = %caller.correlation_id,
                        code = %saved.code,
                        amount = %saved.amount,
                        attempt,
                        "coupon generated"
                    );
                    return Ok(saved);
                }
                Err(RepositoryError::Duplicate(_)) => continue,
                Err(error) => return Err(error.into()),
            }
        }

        warn!(
            event_name = "coupons.code.exhausted",
            correlation_id = %caller.correlation_id,
            attempts,
            "no free coupon code found"
        );
        Err(DomainError::GenerationExhausted { attempts }.into())
    }

    /// Reads a coupon, persisting passive expiry first.
    pub async fn lookup_coupon(
        &self,
        caller: &Caller,
        raw_code: &str,
    ) -> Result<Coupon, ApplicationError> {
        let code = CouponCode::normalize(raw_code)?;
        let mut coupon = self
            .repos
            .coupons
            .find_by_code(&code)
            .await?
            .ok_or_else(|| DomainError::not_found("coupon", code.0.clone()))?;

        if !coupon.refresh_expiry(now()) {
            return Ok(coupon);
        }
        match self.repos.coupons.update(coupon.clone()).await {
            Ok(saved) => {
                info!(
                    event_name = "coupons.coupon.expired",
                    correlation_id = %caller.correlation_id,
                    code = %saved.code,
                    "coupon passed its expiry and was marked EXPIRED"
                );
                Ok(saved)
            }
            Err(error) => {
                warn!(
                    event_name = "coupons.coupon.expiry_write_failed",
                    correlation_id = %caller.correlation_id,
                    code = %coupon.code,
                    error = %error,
                    "could not persist coupon expiry"
                );
                Ok(coupon)
            }
        }
    }

    /// Legacy full use of a coupon.
    pub async fn honor_coupon(
        &self,
        caller: &Caller,
        raw_code: &str,
    ) -> Result<Coupon, ApplicationError> {
        let mut coupon = self.lookup_coupon(caller, raw_code).await?;
        coupon.honor(caller.id(), &caller.account.display_name, now())?;
        let saved = self.repos.coupons.update(coupon).await?;

        info!(
            event_name = "coupons.coupon.honored",
            correlation_id = %caller.correlation_id,
            code = %saved.code,
            "coupon honored"
        );
        Ok(saved)
    }

    /// Clears the full remaining balance and appends the audit row.
    pub async fn clear_coupon(
        &self,
        caller: &Caller,
        raw_code: &str,
        amount: Money,
    ) -> Result<Coupon, ApplicationError> {
        let mut coupon = self.lookup_coupon(caller, raw_code).await?;
        let record = coupon.clear(caller.id(), &caller.account.display_name, amount, now())?;
        let saved = self.repos.coupons.record_clear(coupon, record).await?;

        info!(
            event_name = "coupons.coupon.cleared",
            correlation_id = %caller.correlation_id,
            code = %saved.code,
            amount = %amount,
            "coupon balance cleared"
        );
        Ok(saved)
    }

    pub async fn coupon_history(
        &self,
        request: CouponHistoryRequest,
    ) -> Result<Page<CouponClearRecord>, ApplicationError> {
        let code = request
            .code
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(CouponCode::normalize)
            .transpose()?;
        let page = self.page_query(request.cursor.as_deref(), request.limit);
        let rows = self.repos.coupons.history_page(code.as_ref(), &page).await?;
        Ok(Page::from_overfetch(rows, page.limit, &self.codec))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use tally_core::authz::Role;
    use tally_core::domain::coupon::{CouponCode, CouponDraft, CouponStatus};
    use tally_core::errors::{ApplicationError, DomainError};
    use tally_core::money::Money;

    use super::CouponHistoryRequest;
    use crate::workflows::testing::Harness;

    fn draft(cents: i64) -> CouponDraft {
        CouponDraft {
            customer_name: "Ann".to_string(),
            server: Some("Dee".to_string()),
            category: Some("service".to_string()),
            reason: Some("long wait".to_string()),
            zelle_name: None,
            amount: Money::from_cents(cents),
        }
    }

    #[tokio::test]
    async fn second_honor_names_the_first_user() {
        let harness = Harness::new();
        let mia = harness.account("Mia", Role::Manager, None).await;
        let eli = harness.account("Eli", Role::Employee, None).await;

        let coupon = harness.workflows.generate_coupon(&mia, draft(2_500)).await.expect("generate");
        assert!(coupon.code.0.starts_with("CPN-"));
        assert_eq!(coupon.remaining_balance, coupon.amount);

        let honored = harness
            .workflows
            .honor_coupon(&eli, &coupon.code.0.to_lowercase())
            .await
            .expect("first honor");
        assert_eq!(honored.status, CouponStatus::Used);
        assert_eq!(honored.remaining_balance, Money::ZERO);

        let error = harness.workflows.honor_coupon(&mia, &coupon.code.0).await.expect_err("again");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::Conflict(ref message)) if message.contains("Eli")
        ));
    }

    #[tokio::test]
    async fn clearing_requires_the_exact_balance_and_records_history() {
        let harness = Harness::new();
        let mia = harness.account("Mia", Role::Manager, None).await;
        let coupon = harness.workflows.generate_coupon(&mia, draft(2_500)).await.expect("generate");

        let error = harness
            .workflows
            .clear_coupon(&mia, &coupon.code.0, Money::from_cents(2_499))
            .await
            .expect_err("mismatch");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::Validation { field: "amount", .. })
        ));

        let cleared = harness
            .workflows
            .clear_coupon(&mia, &coupon.code.0, Money::parse("amount", "25").expect("amount"))
            .await
            .expect("clear");
        assert_eq!(cleared.status, CouponStatus::Used);

        let history = harness
            .workflows
            .coupon_history(CouponHistoryRequest {
                code: Some(coupon.code.0.clone()),
                ..Default::default()
            })
            .await
            .expect("history");
        assert_eq!(history.items.len(), 1);
        assert_eq!(history.items[0].cleared_amount, Money::from_cents(2_500));
        assert_eq!(history.items[0].cleared_by_name, "Mia");
    }

    #[tokio::test]
    async fn expired_coupons_are_persisted_on_read() {
        let harness = Harness::new();
        let mia = harness.account("Mia", Role::Manager, None).await;
        let coupon = harness.workflows.generate_coupon(&mia, draft(1_000)).await.expect("generate");

        let mut aged = coupon.clone();
        aged.expires_at = coupon.issued_at - Duration::days(1);
        let repos = harness.workflows.repositories();
        repos.coupons.update(aged).await.expect("age coupon");

        let looked_up = harness.workflows.lookup_coupon(&mia, &coupon.code.0).await.expect("lookup");
        assert_eq!(looked_up.status, CouponStatus::Expired);
        let stored = repos.coupons.find_by_code(&coupon.code).await.expect("find").expect("exists");
        assert_eq!(stored.status, CouponStatus::Expired);

        let error = harness
            .workflows
            .clear_coupon(&mia, &coupon.code.0, Money::from_cents(1_000))
            .await
            .expect_err("expired");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::Conflict(ref message)) if message.contains("expired")
        ));
    }

    #[tokio::test]
    async fn collisions_retry_until_the_bound() {
        let harness = Harness::new();
        let mia = harness.account("Mia", Role::Manager, None).await;
        let taken = CouponCode("CPN-20240115-TAKEN2".to_string());
        let fresh = CouponCode("CPN-20240115-FRESH3".to_string());

        let first = harness
            .workflows
            .generate_coupon_with(&mia, draft(500), |_| taken.clone())
            .await
            .expect("first use of code");
        assert_eq!(first.code, taken);

        let mut calls = 0;
        let second = harness
            .workflows
            .generate_coupon_with(&mia, draft(500), |_| {
                calls += 1;
                if calls < 3 {
                    taken.clone()
                } else {
                    fresh.clone()
                }
            })
            .await
            .expect("retried");
        assert_eq!(second.code, fresh);
        assert_eq!(calls, 3);

        let error = harness
            .workflows
            .generate_coupon_with(&mia, draft(500), |_| taken.clone())
            .await
            .expect_err("exhausted");
        assert_eq!(
            error,
            ApplicationError::Domain(DomainError::GenerationExhausted { attempts: 10 })
        );
    }

    #[tokio::test]
    async fn non_positive_amounts_are_rejected_before_allocation() {
        let harness = Harness::new();
        let mia = harness.account("Mia", Role::Manager, None).await;

        let error = harness.workflows.generate_coupon(&mia, draft(0)).await.expect_err("zero");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::Validation { field: "amount", .. })
        ));
        let error = harness.workflows.lookup_coupon(&mia, "CPN-NOPE").await.expect_err("missing");
        assert!(matches!(error, ApplicationError::Domain(DomainError::NotFound { .. })));
    }
}
