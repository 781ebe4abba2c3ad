use crate::schemas::{Couple, Month, Split};
use serde::Serialize;

/// A directed debt between the two members: `from` owes `to`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Debt {
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub description: String,
}

// Debts are kept as-is, one entry per record. Opposite directions are
// not netted against each other; that is left to whoever consumes the
// list.
pub fn normalize_debts(couple: &Couple, month: Month) -> Vec<Debt> {
    let mut debts = Vec::new();

    for expense in &couple.expenses {
        if !month.contains(expense.date) {
            continue;
        }
        let (debtor, creditor, amount) = match expense.split {
            Split::Even => (
                expense.paid_by.other(),
                expense.paid_by,
                expense.amount / 2.0,
            ),
            // The partner the expense is assigned to reimburses the
            // payer in full. If they paid it themselves there is
            // nothing to settle.
            Split::Full(responsible) if responsible != expense.paid_by => {
                (responsible, expense.paid_by, expense.amount)
            }
            Split::Full(_) => continue,
        };
        debts.push(Debt {
            from: couple.name_of(debtor).to_string(),
            to: couple.name_of(creditor).to_string(),
            amount: round_to_2_decimals(amount),
            description: format!("Expense: {}", expense.description),
        });
    }

    for loan in &couple.loans {
        for installment in &loan.installment_details {
            if installment.is_paid || !month.contains(installment.due_date) {
                continue;
            }
            debts.push(Debt {
                from: couple.name_of(loan.borrower).to_string(),
                to: couple.name_of(loan.lender).to_string(),
                amount: round_to_2_decimals(installment.amount),
                description: format!(
                    "Loan installment ({}/{}): {}",
                    installment.installment_number, loan.installments, loan.description
                ),
            });
        }
    }

    for credit in &couple.pre_credits {
        if !month.contains(credit.date) {
            continue;
        }
        debts.push(Debt {
            from: couple.name_of(credit.author.other()).to_string(),
            to: couple.name_of(credit.author).to_string(),
            amount: round_to_2_decimals(credit.amount),
            description: format!("Pre-credit: {}", credit.description),
        });
    }

    debts
}

fn round_to_2_decimals(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::{Category, Expense, ExpenseKind, Loan, Partner, PreCredit};
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    const MONTH: Month = Month { year: 2024, month: 5 };

    fn date(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
    }

    fn couple() -> Couple {
        Couple {
            id: "our-house".to_string(),
            partner_a: "Alice".to_string(),
            partner_b: "Bruno".to_string(),
            expenses: vec![],
            loans: vec![],
            pre_credits: vec![],
            recurring_expenses: vec![],
        }
    }

    fn expense(amount: f64, paid_by: Partner, split: Split) -> Expense {
        Expense {
            id: Uuid::new_v4(),
            description: "groceries".to_string(),
            amount,
            paid_by,
            split,
            category: Category::Food,
            date: date(10),
            is_paid: true,
            payment_details: String::new(),
            kind: ExpenseKind::OneOff,
        }
    }

    #[test]
    fn even_split_halves_the_amount_towards_the_payer() {
        let mut couple = couple();
        couple.expenses.push(expense(100.0, Partner::A, Split::Even));
        let debts = normalize_debts(&couple, MONTH);
        assert_eq!(debts.len(), 1);
        assert_eq!(debts[0].from, "Bruno");
        assert_eq!(debts[0].to, "Alice");
        assert_eq!(debts[0].amount, 50.0);
    }

    #[test]
    fn full_split_reimburses_the_payer_in_full() {
        let mut couple = couple();
        couple
            .expenses
            .push(expense(80.0, Partner::B, Split::Full(Partner::A)));
        let debts = normalize_debts(&couple, MONTH);
        assert_eq!(debts.len(), 1);
        assert_eq!(debts[0].from, "Alice");
        assert_eq!(debts[0].to, "Bruno");
        assert_eq!(debts[0].amount, 80.0);
    }

    #[test]
    fn full_split_paid_by_its_own_partner_settles_nothing() {
        let mut couple = couple();
        couple
            .expenses
            .push(expense(80.0, Partner::A, Split::Full(Partner::A)));
        assert!(normalize_debts(&couple, MONTH).is_empty());
    }

    #[test]
    fn expenses_outside_the_month_are_ignored() {
        let mut couple = couple();
        let mut exp = expense(100.0, Partner::A, Split::Even);
        exp.date = Utc.with_ymd_and_hms(2024, 4, 30, 12, 0, 0).unwrap();
        couple.expenses.push(exp);
        assert!(normalize_debts(&couple, MONTH).is_empty());
    }

    #[test]
    fn only_unpaid_installments_due_in_the_month_count() {
        let mut couple = couple();
        let mut loan = Loan::new(
            "laptop".to_string(),
            900.0,
            Partner::A,
            Partner::B,
            3,
            Utc.with_ymd_and_hms(2024, 4, 5, 12, 0, 0).unwrap(),
        );
        // First installment (April) paid, second falls due in May,
        // third in June.
        loan.pay_next(Utc.with_ymd_and_hms(2024, 4, 6, 12, 0, 0).unwrap());
        couple.loans.push(loan);

        let debts = normalize_debts(&couple, MONTH);
        assert_eq!(debts.len(), 1);
        assert_eq!(debts[0].from, "Bruno");
        assert_eq!(debts[0].to, "Alice");
        assert_eq!(debts[0].amount, 300.0);
        assert_eq!(debts[0].description, "Loan installment (2/3): laptop");
    }

    #[test]
    fn paid_installment_due_in_the_month_is_skipped() {
        let mut couple = couple();
        let mut loan = Loan::new(
            "laptop".to_string(),
            900.0,
            Partner::A,
            Partner::B,
            3,
            date(5),
        );
        loan.pay_next(date(6));
        couple.loans.push(loan);
        // Only the May installment was due this month and it is paid.
        assert!(normalize_debts(&couple, MONTH).is_empty());
    }

    #[test]
    fn pre_credit_is_owed_back_to_its_author() {
        let mut couple = couple();
        couple.pre_credits.push(PreCredit {
            id: Uuid::new_v4(),
            description: "rent advance".to_string(),
            amount: 250.0,
            author: Partner::A,
            date: date(3),
        });
        let debts = normalize_debts(&couple, MONTH);
        assert_eq!(debts.len(), 1);
        assert_eq!(debts[0].from, "Bruno");
        assert_eq!(debts[0].to, "Alice");
        assert_eq!(debts[0].amount, 250.0);
        assert_eq!(debts[0].description, "Pre-credit: rent advance");
    }

    #[test]
    fn entries_are_emitted_separately_without_netting() {
        let mut couple = couple();
        couple.expenses.push(expense(100.0, Partner::A, Split::Even));
        couple
            .expenses
            .push(expense(50.0, Partner::A, Split::Full(Partner::B)));
        let debts = normalize_debts(&couple, MONTH);
        assert_eq!(debts.len(), 2);
        assert_eq!((debts[0].from.as_str(), debts[0].to.as_str()), ("Bruno", "Alice"));
        assert_eq!(debts[0].amount, 50.0);
        assert_eq!((debts[1].from.as_str(), debts[1].to.as_str()), ("Bruno", "Alice"));
        assert_eq!(debts[1].amount, 50.0);
    }

    #[test]
    fn amounts_are_rounded_to_cents() {
        let mut couple = couple();
        couple.expenses.push(expense(33.33, Partner::B, Split::Even));
        let debts = normalize_debts(&couple, MONTH);
        assert_eq!(debts[0].amount, 16.67);
    }
}
