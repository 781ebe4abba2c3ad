use actix_cors::Cors;
use actix_web::{delete, get, post, put, web, App, HttpRequest, HttpResponse, HttpServer};
use chrono::{DateTime, Utc};
use mongodb::{bson::doc, Client, Collection};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod auth;
mod debts;
mod reconcile;
mod schemas;
mod summary;

use crate::auth::AuthLevel;
use crate::debts::normalize_debts;
use crate::schemas::{
    Category, Couple, Expense, ExpenseKind, Loan, Month, Partner, PreCredit, RecurringExpense,
    Split,
};
use crate::summary::monthly_summary;

fn couples(client: &Client) -> Collection<Couple> {
    client.database("CoupleCash").collection("Couples")
}

#[derive(Deserialize)]
struct MonthQuery {
    month: Month,
}

#[derive(Deserialize)]
struct LoginJson {
    name: String,
}

#[derive(Serialize)]
struct TokenJson {
    token: String,
}

#[post("/login")]
async fn login(request: HttpRequest, json: web::Json<LoginJson>) -> HttpResponse {
    if auth::check_authorization(&request) != Some(AuthLevel::Service) {
        return HttpResponse::Unauthorized().finish();
    }
    let Ok(secret) = std::env::var("SESSION_SECRET") else {
        return HttpResponse::InternalServerError().body("SESSION_SECRET is not configured");
    };
    let token = auth::issue_token(&json.name, Utc::now().timestamp(), &secret);
    HttpResponse::Ok().json(TokenJson { token })
}

#[derive(Deserialize)]
struct CoupleNamesJson {
    partner_a: String,
    partner_b: String,
}

#[put("/couples/{id}")]
async fn add_couple(
    client: web::Data<Client>,
    request: HttpRequest,
    id: web::Path<String>,
    json: web::Json<CoupleNamesJson>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let names = json.into_inner();
    let couple = Couple {
        id: id.into_inner(),
        partner_a: names.partner_a,
        partner_b: names.partner_b,
        expenses: vec![],
        loans: vec![],
        pre_credits: vec![],
        recurring_expenses: vec![],
    };
    match couples(&client).insert_one(couple, None).await {
        Ok(_) => HttpResponse::Ok().body("Couple added"),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[get("/couples/{id}")]
async fn get_couple(
    client: web::Data<Client>,
    request: HttpRequest,
    id: web::Path<String>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    match couples(&client).find_one(doc! { "id": id.into_inner() }, None).await {
        Ok(Some(couple)) => HttpResponse::Ok().json(couple),
        Ok(None) => HttpResponse::NotFound().body("Couldn't find the desired couple"),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[derive(Deserialize)]
struct ExpenseJson {
    description: String,
    amount: f64,
    paid_by: Partner,
    split: Split,
    category: Category,
    date: DateTime<Utc>,
}

#[post("/couples/{id}/expenses")]
async fn add_expense(
    client: web::Data<Client>,
    request: HttpRequest,
    id: web::Path<String>,
    json: web::Json<ExpenseJson>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let input = json.into_inner();
    if input.amount <= 0.0 {
        return HttpResponse::BadRequest().body("amount must be positive");
    }
    let expense = Expense {
        id: Uuid::new_v4(),
        description: input.description,
        amount: input.amount,
        paid_by: input.paid_by,
        split: input.split,
        category: input.category,
        date: input.date,
        is_paid: true,
        payment_details: String::new(),
        kind: ExpenseKind::OneOff,
    };
    match couples(&client)
        .update_one(
            doc! { "id": id.into_inner() },
            doc! { "$push": { "expenses": bson::to_bson(&expense).unwrap() } },
            None,
        )
        .await
    {
        Ok(result) if result.matched_count == 0 => {
            HttpResponse::NotFound().body("Couldn't find the desired couple")
        }
        Ok(_) => HttpResponse::Ok().json(expense),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[derive(Deserialize)]
struct ExpensePaymentJson {
    is_paid: bool,
    #[serde(default)]
    payment_details: String,
}

#[put("/couples/{id}/expenses/{eid}/payment")]
async fn set_expense_payment(
    client: web::Data<Client>,
    request: HttpRequest,
    path: web::Path<(String, Uuid)>,
    json: web::Json<ExpensePaymentJson>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let (id, eid) = path.into_inner();
    let payment = json.into_inner();
    match couples(&client)
        .update_one(
            doc! { "id": id, "expenses.id": eid.to_string() },
            doc! { "$set": {
                "expenses.$.is_paid": payment.is_paid,
                "expenses.$.payment_details": payment.payment_details,
            } },
            None,
        )
        .await
    {
        Ok(result) if result.matched_count == 0 => {
            HttpResponse::NotFound().body("Couldn't find the desired expense")
        }
        Ok(_) => HttpResponse::Ok().body("Expense updated"),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[delete("/couples/{id}/expenses/{eid}")]
async fn delete_expense(
    client: web::Data<Client>,
    request: HttpRequest,
    path: web::Path<(String, Uuid)>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let (id, eid) = path.into_inner();
    match couples(&client)
        .update_one(
            doc! { "id": id },
            doc! { "$pull": { "expenses": { "id": eid.to_string() } } },
            None,
        )
        .await
    {
        Ok(result) if result.matched_count == 0 => {
            HttpResponse::NotFound().body("Couldn't find the desired couple")
        }
        Ok(result) if result.modified_count == 0 => {
            HttpResponse::NotFound().body("Couldn't find the desired expense")
        }
        Ok(_) => HttpResponse::Ok().body("Expense removed"),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

// Clears every expense dated in the given month, the "start the month
// over" action.
#[delete("/couples/{id}/expenses")]
async fn clear_month(
    client: web::Data<Client>,
    request: HttpRequest,
    id: web::Path<String>,
    query: web::Query<MonthQuery>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let id = id.into_inner();
    let month = query.month;
    let collection = couples(&client);
    let couple = match collection.find_one(doc! { "id": &id }, None).await {
        Ok(Some(couple)) => couple,
        Ok(None) => return HttpResponse::NotFound().body("Couldn't find the desired couple"),
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    let retained: Vec<Expense> = couple
        .expenses
        .iter()
        .filter(|e| !month.contains(e.date))
        .cloned()
        .collect();
    let removed = couple.expenses.len() - retained.len();
    match collection
        .update_one(
            doc! { "id": &id },
            doc! { "$set": { "expenses": bson::to_bson(&retained).unwrap() } },
            None,
        )
        .await
    {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "removed": removed })),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[derive(Deserialize)]
struct LoanJson {
    description: String,
    total_amount: f64,
    lender: Partner,
    borrower: Partner,
    installments: u32,
    date: DateTime<Utc>,
}

#[post("/couples/{id}/loans")]
async fn add_loan(
    client: web::Data<Client>,
    request: HttpRequest,
    id: web::Path<String>,
    json: web::Json<LoanJson>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let input = json.into_inner();
    if input.lender == input.borrower {
        return HttpResponse::BadRequest().body("lender and borrower must differ");
    }
    if input.installments == 0 {
        return HttpResponse::BadRequest().body("a loan needs at least one installment");
    }
    if input.total_amount <= 0.0 {
        return HttpResponse::BadRequest().body("amount must be positive");
    }
    let loan = Loan::new(
        input.description,
        input.total_amount,
        input.lender,
        input.borrower,
        input.installments,
        input.date,
    );
    match couples(&client)
        .update_one(
            doc! { "id": id.into_inner() },
            doc! { "$push": { "loans": bson::to_bson(&loan).unwrap() } },
            None,
        )
        .await
    {
        Ok(result) if result.matched_count == 0 => {
            HttpResponse::NotFound().body("Couldn't find the desired couple")
        }
        Ok(_) => HttpResponse::Ok().json(loan),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[post("/couples/{id}/loans/{lid}/pay")]
async fn pay_installment(
    client: web::Data<Client>,
    request: HttpRequest,
    path: web::Path<(String, Uuid)>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let (id, lid) = path.into_inner();
    let collection = couples(&client);
    let couple = match collection.find_one(doc! { "id": &id }, None).await {
        Ok(Some(couple)) => couple,
        Ok(None) => return HttpResponse::NotFound().body("Couldn't find the desired couple"),
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    let Some(loan) = couple.loans.iter().find(|l| l.id == lid) else {
        return HttpResponse::NotFound().body("Couldn't find the desired loan");
    };
    let mut loan = loan.clone();
    if loan.pay_next(Utc::now()).is_none() {
        return HttpResponse::Conflict().body("All installments are already paid");
    }
    match collection
        .update_one(
            doc! { "id": &id, "loans.id": lid.to_string() },
            doc! { "$set": { "loans.$": bson::to_bson(&loan).unwrap() } },
            None,
        )
        .await
    {
        Ok(_) => HttpResponse::Ok().json(loan),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[derive(Deserialize)]
struct InstallmentUpdateJson {
    is_paid: Option<bool>,
    payment_details: Option<String>,
}

#[put("/couples/{id}/loans/{lid}/installments/{number}")]
async fn update_installment(
    client: web::Data<Client>,
    request: HttpRequest,
    path: web::Path<(String, Uuid, u32)>,
    json: web::Json<InstallmentUpdateJson>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let (id, lid, number) = path.into_inner();
    let input = json.into_inner();
    let collection = couples(&client);
    let couple = match collection.find_one(doc! { "id": &id }, None).await {
        Ok(Some(couple)) => couple,
        Ok(None) => return HttpResponse::NotFound().body("Couldn't find the desired couple"),
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    let Some(loan) = couple.loans.iter().find(|l| l.id == lid) else {
        return HttpResponse::NotFound().body("Couldn't find the desired loan");
    };
    let mut loan = loan.clone();
    if !loan.update_installment(number, input.is_paid, input.payment_details, Utc::now()) {
        return HttpResponse::NotFound().body("Couldn't find the desired installment");
    }
    match collection
        .update_one(
            doc! { "id": &id, "loans.id": lid.to_string() },
            doc! { "$set": { "loans.$": bson::to_bson(&loan).unwrap() } },
            None,
        )
        .await
    {
        Ok(_) => HttpResponse::Ok().json(loan),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[delete("/couples/{id}/loans/{lid}")]
async fn delete_loan(
    client: web::Data<Client>,
    request: HttpRequest,
    path: web::Path<(String, Uuid)>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let (id, lid) = path.into_inner();
    match couples(&client)
        .update_one(
            doc! { "id": id },
            doc! { "$pull": { "loans": { "id": lid.to_string() } } },
            None,
        )
        .await
    {
        Ok(result) if result.matched_count == 0 => {
            HttpResponse::NotFound().body("Couldn't find the desired couple")
        }
        Ok(result) if result.modified_count == 0 => {
            HttpResponse::NotFound().body("Couldn't find the desired loan")
        }
        Ok(_) => HttpResponse::Ok().body("Loan removed"),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[derive(Deserialize)]
struct PreCreditJson {
    description: String,
    amount: f64,
    author: Partner,
    date: DateTime<Utc>,
}

#[post("/couples/{id}/pre-credits")]
async fn add_pre_credit(
    client: web::Data<Client>,
    request: HttpRequest,
    id: web::Path<String>,
    json: web::Json<PreCreditJson>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let input = json.into_inner();
    if input.amount <= 0.0 {
        return HttpResponse::BadRequest().body("amount must be positive");
    }
    let credit = PreCredit {
        id: Uuid::new_v4(),
        description: input.description,
        amount: input.amount,
        author: input.author,
        date: input.date,
    };
    match couples(&client)
        .update_one(
            doc! { "id": id.into_inner() },
            doc! { "$push": { "pre_credits": bson::to_bson(&credit).unwrap() } },
            None,
        )
        .await
    {
        Ok(result) if result.matched_count == 0 => {
            HttpResponse::NotFound().body("Couldn't find the desired couple")
        }
        Ok(_) => HttpResponse::Ok().json(credit),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[put("/couples/{id}/pre-credits/{pid}")]
async fn update_pre_credit(
    client: web::Data<Client>,
    request: HttpRequest,
    path: web::Path<(String, Uuid)>,
    json: web::Json<PreCreditJson>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let (id, pid) = path.into_inner();
    let input = json.into_inner();
    if input.amount <= 0.0 {
        return HttpResponse::BadRequest().body("amount must be positive");
    }
    let credit = PreCredit {
        id: pid,
        description: input.description,
        amount: input.amount,
        author: input.author,
        date: input.date,
    };
    match couples(&client)
        .update_one(
            doc! { "id": id, "pre_credits.id": pid.to_string() },
            doc! { "$set": { "pre_credits.$": bson::to_bson(&credit).unwrap() } },
            None,
        )
        .await
    {
        Ok(result) if result.matched_count == 0 => {
            HttpResponse::NotFound().body("Couldn't find the desired pre-credit")
        }
        Ok(_) => HttpResponse::Ok().json(credit),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[delete("/couples/{id}/pre-credits/{pid}")]
async fn delete_pre_credit(
    client: web::Data<Client>,
    request: HttpRequest,
    path: web::Path<(String, Uuid)>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let (id, pid) = path.into_inner();
    match couples(&client)
        .update_one(
            doc! { "id": id },
            doc! { "$pull": { "pre_credits": { "id": pid.to_string() } } },
            None,
        )
        .await
    {
        Ok(result) if result.matched_count == 0 => {
            HttpResponse::NotFound().body("Couldn't find the desired couple")
        }
        Ok(result) if result.modified_count == 0 => {
            HttpResponse::NotFound().body("Couldn't find the desired pre-credit")
        }
        Ok(_) => HttpResponse::Ok().body("Pre-credit removed"),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[derive(Deserialize)]
struct RecurringExpenseJson {
    day_of_month: u32,
    description: String,
    category: Category,
    amount: f64,
    split: Split,
    paid_by: Partner,
}

#[post("/couples/{id}/recurring-expenses")]
async fn add_recurring_expense(
    client: web::Data<Client>,
    request: HttpRequest,
    id: web::Path<String>,
    json: web::Json<RecurringExpenseJson>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let input = json.into_inner();
    if input.amount <= 0.0 {
        return HttpResponse::BadRequest().body("amount must be positive");
    }
    if !(1..=31).contains(&input.day_of_month) {
        return HttpResponse::BadRequest().body("day_of_month must be between 1 and 31");
    }
    let template = RecurringExpense {
        id: Uuid::new_v4(),
        day_of_month: input.day_of_month,
        description: input.description,
        category: input.category,
        amount: input.amount,
        split: input.split,
        paid_by: input.paid_by,
    };
    match couples(&client)
        .update_one(
            doc! { "id": id.into_inner() },
            doc! { "$push": { "recurring_expenses": bson::to_bson(&template).unwrap() } },
            None,
        )
        .await
    {
        Ok(result) if result.matched_count == 0 => {
            HttpResponse::NotFound().body("Couldn't find the desired couple")
        }
        Ok(_) => HttpResponse::Ok().json(template),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[delete("/couples/{id}/recurring-expenses/{rid}")]
async fn delete_recurring_expense(
    client: web::Data<Client>,
    request: HttpRequest,
    path: web::Path<(String, Uuid)>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let (id, rid) = path.into_inner();
    match couples(&client)
        .update_one(
            doc! { "id": id },
            doc! { "$pull": { "recurring_expenses": { "id": rid.to_string() } } },
            None,
        )
        .await
    {
        Ok(result) if result.matched_count == 0 => {
            HttpResponse::NotFound().body("Couldn't find the desired couple")
        }
        Ok(result) if result.modified_count == 0 => {
            HttpResponse::NotFound().body("Couldn't find the desired recurring expense")
        }
        Ok(_) => HttpResponse::Ok().body("Recurring expense removed"),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

// Stamps one concrete expense per template into the month, in a single
// push.
#[post("/couples/{id}/recurring-expenses/apply")]
async fn apply_recurring_expenses(
    client: web::Data<Client>,
    request: HttpRequest,
    id: web::Path<String>,
    query: web::Query<MonthQuery>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let id = id.into_inner();
    let month = query.month;
    let collection = couples(&client);
    let couple = match collection.find_one(doc! { "id": &id }, None).await {
        Ok(Some(couple)) => couple,
        Ok(None) => return HttpResponse::NotFound().body("Couldn't find the desired couple"),
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    if couple.recurring_expenses.is_empty() {
        return HttpResponse::Conflict().body("No recurring expenses to apply");
    }
    let applied: Vec<Expense> = couple
        .recurring_expenses
        .iter()
        .map(|template| template.materialize(month))
        .collect();
    match collection
        .update_one(
            doc! { "id": &id },
            doc! { "$push": { "expenses": { "$each": bson::to_bson(&applied).unwrap() } } },
            None,
        )
        .await
    {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({ "applied": applied.len() })),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[get("/couples/{id}/summary")]
async fn get_summary(
    client: web::Data<Client>,
    request: HttpRequest,
    id: web::Path<String>,
    query: web::Query<MonthQuery>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    match couples(&client).find_one(doc! { "id": id.into_inner() }, None).await {
        Ok(Some(couple)) => HttpResponse::Ok().json(monthly_summary(&couple, query.month)),
        Ok(None) => HttpResponse::NotFound().body("Couldn't find the desired couple"),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[get("/couples/{id}/debts")]
async fn get_debts(
    client: web::Data<Client>,
    request: HttpRequest,
    id: web::Path<String>,
    query: web::Query<MonthQuery>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    match couples(&client).find_one(doc! { "id": id.into_inner() }, None).await {
        Ok(Some(couple)) => HttpResponse::Ok().json(normalize_debts(&couple, query.month)),
        Ok(None) => HttpResponse::NotFound().body("Couldn't find the desired couple"),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[post("/couples/{id}/reconcile")]
async fn reconcile_debts(
    client: web::Data<Client>,
    request: HttpRequest,
    id: web::Path<String>,
    query: web::Query<MonthQuery>,
) -> HttpResponse {
    if auth::check_authorization(&request).is_none() {
        return HttpResponse::Unauthorized().finish();
    }
    let couple = match couples(&client).find_one(doc! { "id": id.into_inner() }, None).await {
        Ok(Some(couple)) => couple,
        Ok(None) => return HttpResponse::NotFound().body("Couldn't find the desired couple"),
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    let debts = normalize_debts(&couple, query.month);
    match reconcile::reconcile(&debts, &couple.partner_a, &couple.partner_b).await {
        Ok(summary) => HttpResponse::Ok().json(serde_json::json!({ "summary": summary })),
        Err(err) => {
            tracing::error!(couple = %couple.id, month = %query.month, error = %err, "debt reconciliation failed");
            HttpResponse::BadGateway().body("failed to reconcile debts")
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("couplecash=info".parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let uri = std::env::var("MONGODB_URI").expect("You need to add the MONGODB_URI to the env");
    let client = Client::with_uri_str(uri).await.expect("failed to connect");
    tracing::info!("connected to MongoDB");

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(web::Data::new(client.clone()))
            .service(login)
            .service(add_couple)
            .service(get_couple)
            .service(add_expense)
            .service(set_expense_payment)
            .service(delete_expense)
            .service(clear_month)
            .service(add_loan)
            .service(pay_installment)
            .service(update_installment)
            .service(delete_loan)
            .service(add_pre_credit)
            .service(update_pre_credit)
            .service(delete_pre_credit)
            .service(add_recurring_expense)
            .service(delete_recurring_expense)
            .service(apply_recurring_expenses)
            .service(get_summary)
            .service(get_debts)
            .service(reconcile_debts)
    })
    .bind(("0.0.0.0", 8080))?
    .run()
    .await
}
