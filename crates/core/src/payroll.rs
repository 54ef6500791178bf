//! Monthly salary arithmetic.
//!
//! Deductions are summed as positive debits and subtracted from gross pay
//! once; only the final figure is clamped at zero.

use serde::{Deserialize, Serialize};

use crate::domain::calendar::MonthKey;
use crate::domain::order::{OrderStatus, OrderSubmission};
use crate::domain::user::{UserAccount, UserId};
use crate::domain::warning::Deduction;
use crate::money::Money;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalaryReport {
    pub user_id: UserId,
    pub month_key: MonthKey,
    pub approved_orders_count: u64,
    pub rate_per_order: Option<Money>,
    pub gross_pay: Money,
    pub total_deductions: Money,
    pub salary: Money,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMonthRow {
    pub user_id: UserId,
    pub display_name: String,
    pub submitted_total: u64,
    pub approved_total: u64,
    pub pending_days: u32,
    pub salary: Money,
}

pub struct SalaryEngine;

impl SalaryEngine {
    /// Rows outside `user` or `month` are ignored, so callers may pass
    /// broader slices than strictly needed.
    pub fn calculate(
        user: &UserAccount,
        month: MonthKey,
        orders: &[OrderSubmission],
        deductions: &[Deduction],
    ) -> SalaryReport {
        let approved_orders_count: u64 = orders
            .iter()
            .filter(|order| order.user_id == user.id && month.contains(&order.date_key))
            .map(OrderSubmission::payable_count)
            .sum();

        let (start, end) = month.window();
        let total_deductions: Money = deductions
            .iter()
            .filter(|deduction| {
                deduction.user_id == user.id
                    && deduction.created_at >= start
                    && deduction.created_at < end
            })
            .map(|deduction| deduction.amount)
            .sum();

        let gross_pay =
            user.rate_per_order.map(|rate| rate.times(approved_orders_count)).unwrap_or(Money::ZERO);
        let salary = (gross_pay - total_deductions).clamp_to_zero();

        SalaryReport {
            user_id: user.id.clone(),
            month_key: month,
            approved_orders_count,
            rate_per_order: user.rate_per_order,
            gross_pay,
            total_deductions,
            salary,
        }
    }

    pub fn team_row(
        user: &UserAccount,
        month: MonthKey,
        orders: &[OrderSubmission],
        deductions: &[Deduction],
    ) -> TeamMonthRow {
        let own: Vec<&OrderSubmission> = orders
            .iter()
            .filter(|order| order.user_id == user.id && month.contains(&order.date_key))
            .collect();
        let report = Self::calculate(user, month, orders, deductions);

        TeamMonthRow {
            user_id: user.id.clone(),
            display_name: user.display_name.clone(),
            submitted_total: own.iter().map(|order| u64::from(order.submitted_count)).sum(),
            approved_total: report.approved_orders_count,
            pending_days: own.iter().filter(|order| order.status == OrderStatus::Pending).count()
                as u32,
            salary: report.salary,
        }
    }
}
