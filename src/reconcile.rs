use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::debts::Debt;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You are a financial advisor specializing in helping couples \
manage their finances. Based on the provided debt information, determine the net amount \
owed between the two partners. Consider all debts and provide a clear summary indicating \
who owes whom and the final amount.";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,
    #[error("request to the text-generation service failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("text-generation service returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("text-generation service returned no content")]
    EmptyResponse,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

pub fn build_prompt(debts: &[Debt], partner_a: &str, partner_b: &str) -> String {
    let mut prompt = format!(
        "Debts between {} and {} for the selected month:\n",
        partner_a, partner_b
    );
    if debts.is_empty() {
        prompt.push_str("(no debts recorded for this month)\n");
    }
    for debt in debts {
        prompt.push_str(&format!(
            "- {} owes {}: {:.2} ({})\n",
            debt.from, debt.to, debt.amount, debt.description
        ));
    }
    prompt.push_str(&format!(
        "\nSummarize the debts and the net balance between {} and {}.",
        partner_a, partner_b
    ));
    prompt
}

/// One attempt against the text-generation service, no retries. The
/// caller decides how much of the failure to show.
pub async fn reconcile(
    debts: &[Debt],
    partner_a: &str,
    partner_b: &str,
) -> Result<String, ReconcileError> {
    let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| ReconcileError::MissingApiKey)?;
    let model =
        std::env::var("RECONCILE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

    let body = ChatRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: build_prompt(debts, partner_a, partner_b),
            },
        ],
        temperature: 0.4,
    };

    let client = reqwest::Client::new();
    let response = client
        .post(CHAT_COMPLETIONS_URL)
        .header(AUTHORIZATION, format!("Bearer {}", api_key))
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ReconcileError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    let parsed: ChatResponse = response.json().await?;
    extract_reply(parsed).ok_or(ReconcileError::EmptyResponse)
}

fn extract_reply(response: ChatResponse) -> Option<String> {
    let content = response.choices.into_iter().next()?.message.content?;
    let content = content.trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}
