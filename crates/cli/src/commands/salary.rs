use chrono::Utc;
use tally_core::domain::calendar::MonthKey;
use tally_core::domain::user::UserId;
use tally_core::payroll::{SalaryEngine, SalaryReport};
use tally_db::Repositories;

use crate::commands::{connect, load_config, runtime, CommandResult, Failure};

/// Operator payroll lookup. Reads straight from the ledger without an actor,
/// so it is meant for the machine the database lives on.
pub fn run(user_id: &str, month: Option<&str>) -> CommandResult {
    let month = match month.map(MonthKey::parse).transpose() {
        Ok(month) => month.unwrap_or_else(|| MonthKey::containing(Utc::now())),
        Err(error) => return CommandResult::failure("salary", "validation", error.to_string(), 2),
    };
    let config = match load_config("salary") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("salary") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect(&config).await?;
        let report = calculate(Repositories::sql(pool.clone()), user_id, month).await;
        pool.close().await;
        report
    });

    match result {
        Ok((display_name, report)) => {
            let message = format!(
                "{display_name} {}: {} approved orders, gross {}, deductions {}, salary {}",
                report.month_key,
                report.approved_orders_count,
                report.gross_pay,
                report.total_deductions,
                report.salary
            );
            CommandResult::success_with("salary", message, serde_json::to_value(&report).ok())
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("salary", error_class, message, exit_code)
        }
    }
}

async fn calculate(
    repos: Repositories,
    user_id: &str,
    month: MonthKey,
) -> Result<(String, SalaryReport), Failure> {
    let user = repos
        .users
        .find_by_id(&UserId(user_id.to_string()))
        .await
        .map_err(|error| ("persistence", error.to_string(), 5u8))?
        .ok_or_else(|| ("not_found", format!("user `{user_id}` was not found"), 7u8))?;

    let ids = [user.id.clone()];
    let orders = repos
        .orders
        .list_for_month(Some(&ids), month)
        .await
        .map_err(|error| ("persistence", error.to_string(), 5u8))?;
    let (start, end) = month.window();
    let deductions = repos
        .warnings
        .deductions_between(Some(&ids), start, end)
        .await
        .map_err(|error| ("persistence", error.to_string(), 5u8))?;

    let report = SalaryEngine::calculate(&user, month, &orders, &deductions);
    Ok((user.display_name, report))
}

#[cfg(test)]
mod tests {
    use super::calculate;
    use tally_core::domain::calendar::MonthKey;
    use tally_db::{connect_with_settings, migrations, DemoSeedDataset, Repositories};

    #[tokio::test]
    async fn seeded_employee_salary_nets_out_the_deduction() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        DemoSeedDataset::load(&pool).await.expect("seed");
        let month = MonthKey::parse("2024-01").expect("month");

        let (name, report) =
            calculate(Repositories::sql(pool.clone()), "usr-demo-eli", month).await.expect("salary");
        assert!(!name.is_empty());
        assert_eq!(report.approved_orders_count, 10);
        assert_eq!(report.gross_pay.to_string(), "57.50");
        assert_eq!(report.total_deductions.to_string(), "12.50");
        assert_eq!(report.salary.to_string(), "45.00");

        let missing = calculate(Repositories::sql(pool.clone()), "usr-nobody", month)
            .await
            .expect_err("unknown user");
        assert_eq!(missing.0, "not_found");
        assert_eq!(missing.2, 7);

        pool.close().await;
    }
}
