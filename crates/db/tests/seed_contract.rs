use serde::Deserialize;
use std::collections::HashSet;

type SeedContractTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
    ($left:expr, $right:expr, $($arg:tt)*) => {
        if $left != $right {
            return Err(format!($($arg)*));
        }
    };
}

#[derive(Debug, Deserialize)]
struct ActorContract {
    id: String,
    role: String,
    #[serde(default)]
    rate_per_order: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TeamContract {
    manager_id: String,
    employee_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OrderContract {
    id: String,
    user_id: String,
    date_key: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RefundContract {
    id: String,
    amount: String,
    refunded_amount: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct CouponContract {
    code: String,
    amount: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct SalaryContract {
    user_id: String,
    month: String,
    salary: String,
}

#[derive(Debug, Deserialize)]
struct SeedContract {
    dataset_version: String,
    seed_dataset: String,
    actors: Vec<ActorContract>,
    team: TeamContract,
    orders: Vec<OrderContract>,
    refunds: Vec<RefundContract>,
    coupons: Vec<CouponContract>,
    expected_salary: SalaryContract,
}

fn load_contract() -> SeedContractTestResult<SeedContract> {
    serde_json::from_str(include_str!("../../../config/fixtures/demo_seed_contract.json"))
        .map_err(|error| format!("seed contract JSON must parse: {error}"))
}

const FIXTURE_SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

#[test]
fn seed_contract_matches_demo_seed_sql_fixture() -> SeedContractTestResult {
    let contract = load_contract()?;

    require_eq!(contract.dataset_version, "tally-demo-1");
    require_eq!(contract.seed_dataset, "deterministic_demo_portal");

    let mut ids_seen = HashSet::new();
    for actor in &contract.actors {
        require!(ids_seen.insert(actor.id.clone()), "duplicate actor id: {}", actor.id);
        require!(
            ["EMPLOYEE", "MANAGER", "ADMIN"].contains(&actor.role.as_str()),
            "unknown role {} for {}",
            actor.role,
            actor.id
        );
        require!(
            FIXTURE_SQL.contains(&format!("'{}'", actor.id)),
            "seed SQL fixture should include actor {}",
            actor.id
        );
        if let Some(rate) = &actor.rate_per_order {
            require!(
                FIXTURE_SQL.contains(&format!("'{rate}'")),
                "seed SQL fixture should carry rate {} for {}",
                rate,
                actor.id
            );
        }
    }

    require!(ids_seen.contains(&contract.team.manager_id));
    for employee_id in &contract.team.employee_ids {
        require!(
            ids_seen.contains(employee_id),
            "team member {} must be a seeded actor",
            employee_id
        );
    }

    for order in &contract.orders {
        require!(ids_seen.contains(&order.user_id), "order owner {} unknown", order.user_id);
        require!(FIXTURE_SQL.contains(&format!("'{}'", order.id)));
        require!(FIXTURE_SQL.contains(&format!("'{}'", order.date_key)));
        require!(["PENDING", "APPROVED", "REJECTED"].contains(&order.status.as_str()));
    }

    for refund in &contract.refunds {
        require!(FIXTURE_SQL.contains(&format!("'{}'", refund.id)));
        require!(FIXTURE_SQL.contains(&format!("'{}'", refund.amount)));
        require!(FIXTURE_SQL.contains(&format!("'{}'", refund.refunded_amount)));
        require_eq!(refund.status, "PENDING");
    }

    for coupon in &contract.coupons {
        require!(coupon.code.starts_with("CPN-"), "coupon code {} is off-format", coupon.code);
        require!(FIXTURE_SQL.contains(&format!("'{}'", coupon.code)));
        require!(FIXTURE_SQL.contains(&format!("'{}'", coupon.amount)));
        require_eq!(coupon.status, "ACTIVE");
    }

    Ok(())
}

#[test]
fn expected_salary_is_consistent_with_seeded_rows() -> SeedContractTestResult {
    let contract = load_contract()?;
    let expected = &contract.expected_salary;

    require_eq!(expected.user_id, "usr-demo-eli");
    require_eq!(expected.month, "2024-01");
    // 10 approved orders at 5.75 less one 12.50 deduction.
    require!(FIXTURE_SQL.contains("'5.75'"));
    require!(FIXTURE_SQL.contains("'12.50'"));
    require_eq!(expected.salary, "45.00");

    let approved_for_user = contract
        .orders
        .iter()
        .filter(|order| order.user_id == expected.user_id && order.status == "APPROVED")
        .count();
    require_eq!(approved_for_user, 1);
    Ok(())
}
