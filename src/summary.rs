use std::collections::HashMap;

use serde::Serialize;

use crate::schemas::{Category, Couple, ExpenseKind, Month, Partner};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub total: f64,
}

/// The numbers the dashboard shows for one month.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthlySummary {
    pub total_expenses: f64,
    pub paid_by_a: f64,
    pub paid_by_b: f64,
    pub active_loans: usize,
    pub remaining_loan_amount: f64,
    pub one_off_total: f64,
    pub recurring_total: f64,
    pub by_category: Vec<CategoryTotal>,
}

pub fn monthly_summary(couple: &Couple, month: Month) -> MonthlySummary {
    let mut total = 0.0;
    let mut paid_by_a = 0.0;
    let mut paid_by_b = 0.0;
    let mut one_off = 0.0;
    let mut recurring = 0.0;
    let mut by_category: HashMap<Category, f64> = HashMap::new();

    for expense in couple.expenses.iter().filter(|e| month.contains(e.date)) {
        total += expense.amount;
        match expense.paid_by {
            Partner::A => paid_by_a += expense.amount,
            Partner::B => paid_by_b += expense.amount,
        }
        match expense.kind {
            ExpenseKind::OneOff => one_off += expense.amount,
            ExpenseKind::Recurring => recurring += expense.amount,
        }
        by_category
            .entry(expense.category)
            .and_modify(|v| *v += expense.amount)
            .or_insert(expense.amount);
    }

    let mut by_category: Vec<CategoryTotal> = by_category
        .into_iter()
        .map(|(category, total)| CategoryTotal { category, total })
        .collect();
    by_category.sort_by(|a, b| b.total.total_cmp(&a.total));

    // Loans are deliberately not scoped to the month; the dashboard
    // tracks their progress across their whole lifetime.
    let active_loans = couple.loans.iter().filter(|l| l.is_active()).count();
    let remaining_loan_amount = couple.loans.iter().map(|l| l.remaining_amount()).sum();

    MonthlySummary {
        total_expenses: total,
        paid_by_a,
        paid_by_b,
        active_loans,
        remaining_loan_amount,
        one_off_total: one_off,
        recurring_total: recurring,
        by_category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::{Expense, Loan, Split};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn expense(amount: f64, paid_by: Partner, category: Category, kind: ExpenseKind) -> Expense {
        Expense {
            id: Uuid::new_v4(),
            description: "x".to_string(),
            amount,
            paid_by,
            split: Split::Even,
            category,
            date: Utc.with_ymd_and_hms(2024, 7, 8, 0, 0, 0).unwrap(),
            is_paid: true,
            payment_details: String::new(),
            kind,
        }
    }

    #[test]
    fn sums_the_month_by_payer_kind_and_category() {
        let mut couple = Couple {
            id: "c".to_string(),
            partner_a: "Alice".to_string(),
            partner_b: "Bruno".to_string(),
            expenses: vec![
                expense(120.0, Partner::A, Category::Food, ExpenseKind::OneOff),
                expense(80.0, Partner::B, Category::Food, ExpenseKind::Recurring),
                expense(50.0, Partner::B, Category::Leisure, ExpenseKind::OneOff),
            ],
            loans: vec![],
            pre_credits: vec![],
            recurring_expenses: vec![],
        };
        // June expense stays out of a July summary.
        let mut stale = expense(999.0, Partner::A, Category::Other, ExpenseKind::OneOff);
        stale.date = Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap();
        couple.expenses.push(stale);

        let summary = monthly_summary(&couple, Month { year: 2024, month: 7 });
        assert_eq!(summary.total_expenses, 250.0);
        assert_eq!(summary.paid_by_a, 120.0);
        assert_eq!(summary.paid_by_b, 130.0);
        assert_eq!(summary.one_off_total, 170.0);
        assert_eq!(summary.recurring_total, 80.0);
        assert_eq!(summary.by_category[0].category, Category::Food);
        assert_eq!(summary.by_category[0].total, 200.0);
        assert_eq!(summary.by_category[1].category, Category::Leisure);
    }

    #[test]
    fn loan_figures_span_all_months() {
        let mut loan = Loan::new(
            "bike".to_string(),
            400.0,
            Partner::A,
            Partner::B,
            4,
            Utc.with_ymd_and_hms(2023, 11, 1, 0, 0, 0).unwrap(),
        );
        loan.pay_next(Utc.with_ymd_and_hms(2023, 11, 2, 0, 0, 0).unwrap());
        let couple = Couple {
            id: "c".to_string(),
            partner_a: "Alice".to_string(),
            partner_b: "Bruno".to_string(),
            expenses: vec![],
            loans: vec![loan],
            pre_credits: vec![],
            recurring_expenses: vec![],
        };
        let summary = monthly_summary(&couple, Month { year: 2024, month: 7 });
        assert_eq!(summary.active_loans, 1);
        assert!((summary.remaining_loan_amount - 300.0).abs() < 0.01);
        assert_eq!(summary.total_expenses, 0.0);
    }
}
