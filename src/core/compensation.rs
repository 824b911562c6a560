use serde::Serialize;
use sqlx::MySqlPool;
use tracing::warn;
use utoipa::ToSchema;

use crate::model::component::{CalcType, ComponentType};

/// One assignment joined with its catalog component, both sides active.
/// Fetched eagerly; the resolver works on plain values only.
#[derive(Debug, sqlx::FromRow)]
pub struct AssignmentRow {
    pub value: Option<f64>,
    pub start_period: Option<String>,
    pub code: String,
    pub name: String,
    pub comp_type: String,
    pub calc_type: String,
    pub default_value: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompensationLine {
    pub name: String,
    pub code: String,
    #[schema(example = "allowance")]
    pub comp_type: String,
    #[schema(example = "fixed")]
    pub calc_type: String,
    pub resolved_value: f64,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct ResolvedCompensation {
    pub base_pay: f64,
    pub allowance_total: f64,
    pub deduction_total: f64,
    pub line_items: Vec<CompensationLine>,
}

pub async fn fetch_assignments(
    pool: &MySqlPool,
    employee_id: u64,
) -> Result<Vec<AssignmentRow>, sqlx::Error> {
    sqlx::query_as::<_, AssignmentRow>(
        r#"
        SELECT ec.value, ec.start_period,
               cc.code, cc.name, cc.comp_type, cc.calc_type, cc.default_value
        FROM employee_compensations ec
        JOIN compensation_components cc ON cc.id = ec.component_id
        WHERE ec.employee_id = ? AND ec.active = TRUE AND cc.active = TRUE
        ORDER BY ec.id
        "#,
    )
    .bind(employee_id)
    .fetch_all(pool)
    .await
}

/// An assignment applies to a pay period iff its start period is empty or
/// lexicographically <= the period ("YYYY-MM" is fixed-width).
fn applies_to_period(start_period: Option<&str>, pay_period: &str) -> bool {
    match start_period {
        None | Some("") => true,
        Some(start) => start <= pay_period,
    }
}

/// Resolve active assignments into base pay, allowance and deduction totals.
///
/// Base components resolve first, fixed before percentage so the result does
/// not depend on row order; percentage base components compute against the
/// running base and are flagged as discouraged. Every other component then
/// resolves against the final base pay and lands in exactly one bucket.
pub fn resolve(rows: &[AssignmentRow], pay_period: &str) -> ResolvedCompensation {
    if pay_period.is_empty() {
        return ResolvedCompensation::default();
    }

    let applicable: Vec<&AssignmentRow> = rows
        .iter()
        .filter(|r| applies_to_period(r.start_period.as_deref(), pay_period))
        .collect();

    let parsed = |r: &AssignmentRow| {
        let comp_type = r.comp_type.parse::<ComponentType>().ok()?;
        let calc_type = r.calc_type.parse::<CalcType>().ok()?;
        Some((comp_type, calc_type))
    };

    // Deterministic base order: fixed first, then percentage on the running
    // base (percentage base components are discouraged, not rejected).
    let mut base_fixed: Vec<&AssignmentRow> = Vec::new();
    let mut base_pct: Vec<&AssignmentRow> = Vec::new();
    for &r in &applicable {
        match parsed(r) {
            Some((ComponentType::Base, CalcType::Fixed)) => base_fixed.push(r),
            Some((ComponentType::Base, CalcType::Percentage)) => base_pct.push(r),
            _ => {}
        }
    }

    let mut base_pay = 0.0;
    for r in base_fixed {
        base_pay += r.value.unwrap_or(r.default_value);
    }
    for r in base_pct {
        warn!(code = %r.code, "Percentage-type base component resolves against running base");
        let raw = r.value.unwrap_or(r.default_value);
        base_pay += base_pay * raw / 100.0;
    }

    let mut out = ResolvedCompensation {
        base_pay,
        ..Default::default()
    };

    for r in &applicable {
        let Some((comp_type, calc_type)) = parsed(r) else {
            warn!(code = %r.code, comp_type = %r.comp_type, "Skipping component with unknown type");
            continue;
        };
        if comp_type == ComponentType::Base {
            continue;
        }

        let raw = r.value.unwrap_or(r.default_value);
        let resolved = match calc_type {
            CalcType::Fixed => raw,
            CalcType::Percentage => base_pay * raw / 100.0,
        };

        match comp_type {
            ComponentType::Allowance => out.allowance_total += resolved,
            ComponentType::Deduction => out.deduction_total += resolved,
            ComponentType::Base => unreachable!(),
        }
        out.line_items.push(CompensationLine {
            name: r.name.clone(),
            code: r.code.clone(),
            comp_type: r.comp_type.clone(),
            calc_type: r.calc_type.clone(),
            resolved_value: resolved,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        code: &str,
        comp_type: &str,
        calc_type: &str,
        default_value: f64,
        value: Option<f64>,
        start_period: Option<&str>,
    ) -> AssignmentRow {
        AssignmentRow {
            value,
            start_period: start_period.map(str::to_string),
            code: code.to_string(),
            name: code.to_string(),
            comp_type: comp_type.to_string(),
            calc_type: calc_type.to_string(),
            default_value,
        }
    }

    #[test]
    fn empty_period_resolves_to_zero() {
        let rows = vec![row("BASE", "base", "fixed", 5_000_000.0, None, None)];
        let res = resolve(&rows, "");
        assert_eq!(res.base_pay, 0.0);
        assert!(res.line_items.is_empty());
    }

    #[test]
    fn percentage_deduction_resolves_against_base() {
        let rows = vec![
            row("BASE", "base", "fixed", 5_000_000.0, None, None),
            row("PENSION", "deduction", "percentage", 2.0, None, None),
        ];
        let res = resolve(&rows, "2025-03");
        assert_eq!(res.base_pay, 5_000_000.0);
        assert_eq!(res.deduction_total, 100_000.0);
        assert_eq!(res.line_items.len(), 1);
        assert_eq!(res.line_items[0].resolved_value, 100_000.0);
    }

    #[test]
    fn assignment_value_overrides_default() {
        let rows = vec![
            row("BASE", "base", "fixed", 5_000_000.0, Some(6_000_000.0), None),
            row("MEAL", "allowance", "fixed", 500_000.0, None, None),
        ];
        let res = resolve(&rows, "2025-03");
        assert_eq!(res.base_pay, 6_000_000.0);
        assert_eq!(res.allowance_total, 500_000.0);
    }

    #[test]
    fn start_period_gates_assignments() {
        let rows = vec![
            row("BASE", "base", "fixed", 5_000_000.0, None, Some("2025-01")),
            row("RAISE", "base", "fixed", 1_000_000.0, None, Some("2025-06")),
        ];
        let res = resolve(&rows, "2025-03");
        assert_eq!(res.base_pay, 5_000_000.0);
        let later = resolve(&rows, "2025-06");
        assert_eq!(later.base_pay, 6_000_000.0);
    }

    #[test]
    fn percentage_base_components_resolve_after_fixed_regardless_of_order() {
        // 10% top-up on a 2,000,000 fixed base, listed first.
        let rows = vec![
            row("TOPUP", "base", "percentage", 10.0, None, None),
            row("BASE", "base", "fixed", 2_000_000.0, None, None),
        ];
        let res = resolve(&rows, "2025-03");
        assert_eq!(res.base_pay, 2_200_000.0);
    }

    #[test]
    fn component_lands_in_exactly_one_bucket() {
        let rows = vec![
            row("BASE", "base", "fixed", 4_000_000.0, None, None),
            row("MEAL", "allowance", "fixed", 300_000.0, None, None),
            row("LATE", "deduction", "fixed", 50_000.0, None, None),
        ];
        let res = resolve(&rows, "2025-03");
        assert_eq!(res.base_pay, 4_000_000.0);
        assert_eq!(res.allowance_total, 300_000.0);
        assert_eq!(res.deduction_total, 50_000.0);
        // base contributes to no line item, others to exactly one
        assert_eq!(res.line_items.len(), 2);
    }
}
