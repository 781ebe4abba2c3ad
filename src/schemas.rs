use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One of the two fixed household members. Display names live on the
/// couple document; records only store which side they belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Partner {
    A,
    B,
}

impl Partner {
    pub fn other(self) -> Partner {
        match self {
            Partner::A => Partner::B,
            Partner::B => Partner::A,
        }
    }
}

/// How an expense is divided between the two members.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(into = "String", try_from = "String")]
pub enum Split {
    Even,
    Full(Partner),
}

impl From<Split> for String {
    fn from(split: Split) -> String {
        match split {
            Split::Even => "50/50".to_string(),
            Split::Full(Partner::A) => "100% A".to_string(),
            Split::Full(Partner::B) => "100% B".to_string(),
        }
    }
}

impl TryFrom<String> for Split {
    type Error = String;

    fn try_from(value: String) -> Result<Split, String> {
        match value.as_str() {
            "50/50" => Ok(Split::Even),
            "100% A" => Ok(Split::Full(Partner::A)),
            "100% B" => Ok(Split::Full(Partner::B)),
            other => Err(format!("unknown split: {}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Category {
    Housing,
    Transport,
    Food,
    Leisure,
    Health,
    Pet,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum ExpenseKind {
    OneOff,
    Recurring,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: Uuid,
    pub description: String,
    pub amount: f64,
    pub paid_by: Partner,
    pub split: Split,
    pub category: Category,
    pub date: DateTime<Utc>,
    pub is_paid: bool,
    #[serde(default)]
    pub payment_details: String,
    pub kind: ExpenseKind,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Installment {
    pub installment_number: u32,
    pub amount: f64,
    pub due_date: DateTime<Utc>,
    pub is_paid: bool,
    pub paid_date: Option<DateTime<Utc>>,
    pub payment_details: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Loan {
    pub id: Uuid,
    pub description: String,
    pub total_amount: f64,
    pub lender: Partner,
    pub borrower: Partner,
    pub installments: u32,
    pub date: DateTime<Utc>,
    pub installment_details: Vec<Installment>,
}

impl Loan {
    pub fn new(
        description: String,
        total_amount: f64,
        lender: Partner,
        borrower: Partner,
        installments: u32,
        date: DateTime<Utc>,
    ) -> Loan {
        Loan {
            id: Uuid::new_v4(),
            description,
            total_amount,
            lender,
            borrower,
            installments,
            date,
            installment_details: Loan::build_installments(total_amount, installments, date),
        }
    }

    /// Equal split of the total, one installment per month starting at
    /// the loan date. The sum matches the total up to float rounding.
    pub fn build_installments(
        total_amount: f64,
        count: u32,
        start: DateTime<Utc>,
    ) -> Vec<Installment> {
        let amount = total_amount / count as f64;
        (0..count)
            .map(|k| Installment {
                installment_number: k + 1,
                amount,
                due_date: add_months(start, k),
                is_paid: false,
                paid_date: None,
                payment_details: None,
            })
            .collect()
    }

    /// Marks the first unpaid installment as paid and returns its
    /// number, or None when the loan is fully paid off.
    pub fn pay_next(&mut self, paid_date: DateTime<Utc>) -> Option<u32> {
        let installment = self.installment_details.iter_mut().find(|i| !i.is_paid)?;
        installment.is_paid = true;
        installment.paid_date = Some(paid_date);
        Some(installment.installment_number)
    }

    pub fn update_installment(
        &mut self,
        number: u32,
        is_paid: Option<bool>,
        payment_details: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(installment) = self
            .installment_details
            .iter_mut()
            .find(|i| i.installment_number == number)
        else {
            return false;
        };
        if let Some(paid) = is_paid {
            installment.is_paid = paid;
            installment.paid_date = if paid { Some(now) } else { None };
        }
        if let Some(details) = payment_details {
            installment.payment_details = Some(details);
        }
        true
    }

    pub fn paid_installments(&self) -> usize {
        self.installment_details.iter().filter(|i| i.is_paid).count()
    }

    pub fn is_active(&self) -> bool {
        self.installment_details.iter().any(|i| !i.is_paid)
    }

    pub fn remaining_amount(&self) -> f64 {
        self.installment_details
            .iter()
            .filter(|i| !i.is_paid)
            .map(|i| i.amount)
            .sum()
    }
}

/// An advance payment by one member, credited against what they would
/// otherwise owe.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PreCredit {
    pub id: Uuid,
    pub description: String,
    pub amount: f64,
    pub author: Partner,
    pub date: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RecurringExpense {
    pub id: Uuid,
    pub day_of_month: u32,
    pub description: String,
    pub category: Category,
    pub amount: f64,
    pub split: Split,
    pub paid_by: Partner,
}

impl RecurringExpense {
    /// Turns the template into a concrete expense for the given month.
    /// Days past the end of the month land on its last day.
    pub fn materialize(&self, month: Month) -> Expense {
        Expense {
            id: Uuid::new_v4(),
            description: self.description.clone(),
            amount: self.amount,
            paid_by: self.paid_by,
            split: self.split,
            category: self.category,
            date: month.date_on(self.day_of_month),
            is_paid: false,
            payment_details: String::new(),
            kind: ExpenseKind::Recurring,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Couple {
    pub id: String,
    pub partner_a: String,
    pub partner_b: String,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub loans: Vec<Loan>,
    #[serde(default)]
    pub pre_credits: Vec<PreCredit>,
    #[serde(default)]
    pub recurring_expenses: Vec<RecurringExpense>,
}

impl Couple {
    pub fn name_of(&self, partner: Partner) -> &str {
        match partner {
            Partner::A => &self.partner_a,
            Partner::B => &self.partner_b,
        }
    }
}

/// A calendar month, passed explicitly to every computation that is
/// scoped to one ("2024-07" on the wire).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn last_day(&self) -> u32 {
        // The month number is validated on construction, so the first
        // of the month always exists.
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap();
        let next = first.checked_add_months(Months::new(1)).unwrap();
        next.pred_opt().unwrap().day()
    }

    pub fn date_on(&self, day: u32) -> DateTime<Utc> {
        let day = day.clamp(1, self.last_day());
        let date = NaiveDate::from_ymd_opt(self.year, self.month, day).unwrap();
        Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
    }
}

impl TryFrom<String> for Month {
    type Error = String;

    fn try_from(value: String) -> Result<Month, String> {
        let (year, month) = value
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got: {}", value))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("invalid year in month: {}", value))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("invalid month in: {}", value))?;
        if !(1..=12).contains(&month) {
            return Err(format!("month out of range: {}", value));
        }
        Ok(Month { year, month })
    }
}

impl std::fmt::Display for Month {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

fn add_months(date: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn installment_schedule_covers_the_total() {
        let schedule = Loan::build_installments(1000.0, 3, date(2024, 1, 15));
        assert_eq!(schedule.len(), 3);
        let sum: f64 = schedule.iter().map(|i| i.amount).sum();
        assert!((sum - 1000.0).abs() < 0.01);
    }

    #[test]
    fn installments_fall_due_monthly() {
        let schedule = Loan::build_installments(300.0, 3, date(2024, 1, 15));
        assert_eq!(schedule[0].due_date, date(2024, 1, 15));
        assert_eq!(schedule[1].due_date, date(2024, 2, 15));
        assert_eq!(schedule[2].due_date, date(2024, 3, 15));
        assert_eq!(
            schedule.iter().map(|i| i.installment_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(schedule.iter().all(|i| !i.is_paid && i.paid_date.is_none()));
    }

    #[test]
    fn pay_next_walks_the_schedule_in_order() {
        let mut loan = Loan::new(
            "car repair".to_string(),
            600.0,
            Partner::A,
            Partner::B,
            2,
            date(2024, 3, 1),
        );
        assert_eq!(loan.pay_next(date(2024, 3, 5)), Some(1));
        assert_eq!(loan.pay_next(date(2024, 4, 5)), Some(2));
        assert_eq!(loan.pay_next(date(2024, 5, 5)), None);
        assert_eq!(loan.paid_installments(), 2);
        assert!(!loan.is_active());
        assert_eq!(loan.remaining_amount(), 0.0);
    }

    #[test]
    fn unpaying_an_installment_clears_its_paid_date() {
        let mut loan = Loan::new(
            "sofa".to_string(),
            400.0,
            Partner::B,
            Partner::A,
            4,
            date(2024, 1, 10),
        );
        loan.pay_next(date(2024, 1, 12));
        assert!(loan.update_installment(1, Some(false), None, date(2024, 1, 13)));
        assert!(!loan.installment_details[0].is_paid);
        assert!(loan.installment_details[0].paid_date.is_none());
        assert!(!loan.update_installment(9, Some(true), None, date(2024, 1, 13)));
    }

    #[test]
    fn recurring_template_materializes_into_the_month() {
        let template = RecurringExpense {
            id: Uuid::new_v4(),
            day_of_month: 10,
            description: "Rent".to_string(),
            category: Category::Housing,
            amount: 1200.0,
            split: Split::Even,
            paid_by: Partner::A,
        };
        let month = Month { year: 2024, month: 6 };
        let expense = template.materialize(month);
        assert_eq!(expense.date, month.date_on(10));
        assert_eq!(expense.kind, ExpenseKind::Recurring);
        assert!(!expense.is_paid);
        assert_eq!(expense.amount, 1200.0);
    }

    #[test]
    fn materialization_clamps_long_days_into_short_months() {
        let template = RecurringExpense {
            id: Uuid::new_v4(),
            day_of_month: 31,
            description: "Gym".to_string(),
            category: Category::Health,
            amount: 80.0,
            split: Split::Full(Partner::B),
            paid_by: Partner::B,
        };
        let expense = template.materialize(Month { year: 2024, month: 2 });
        assert_eq!(expense.date.day(), 29);
    }

    #[test]
    fn month_parses_and_filters_dates() {
        let month = Month::try_from("2024-02".to_string()).unwrap();
        assert_eq!(month, Month { year: 2024, month: 2 });
        assert!(month.contains(date(2024, 2, 29)));
        assert!(!month.contains(date(2024, 3, 1)));
        assert!(Month::try_from("2024-13".to_string()).is_err());
        assert!(Month::try_from("février".to_string()).is_err());
        assert_eq!(month.to_string(), "2024-02");
    }

    #[test]
    fn split_round_trips_through_its_wire_form() {
        for (split, wire) in [
            (Split::Even, "\"50/50\""),
            (Split::Full(Partner::A), "\"100% A\""),
            (Split::Full(Partner::B), "\"100% B\""),
        ] {
            assert_eq!(serde_json::to_string(&split).unwrap(), wire);
            assert_eq!(serde_json::from_str::<Split>(wire).unwrap(), split);
        }
        assert!(serde_json::from_str::<Split>("\"60/40\"").is_err());
    }
}
