use actix_web::{http::header::HeaderValue, HttpRequest};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{env, num::ParseIntError};

type HmacSha256 = Hmac<Sha256>;

/// Who a request is acting as: the trusted service token, or one of
/// the partners holding a signed session token.
#[derive(Debug, PartialEq)]
pub enum AuthLevel {
    Service,
    Partner(String),
}

/// Session tokens are `name:issued_at:signature`, signed with the
/// server-side secret. Expiry is the identity provider's concern;
/// this service only checks that the token was minted by us.
pub fn issue_token(name: &str, issued_at: i64, secret: &str) -> String {
    let signature = sign(name, issued_at, secret)
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<String>();
    format!("{}:{}:{}", name, issued_at, signature)
}

pub fn verify_token(token: &str, secret: &str) -> Option<String> {
    let mut parts = token.rsplitn(3, ':');
    let signature = parts.next()?;
    let issued_at: i64 = parts.next()?.parse().ok()?;
    let name = parts.next()?;
    if name.is_empty() {
        return None;
    }
    let signature = decode_hex(signature)?;
    if sign(name, issued_at, secret) == signature {
        Some(name.to_string())
    } else {
        None
    }
}

pub fn check_authorization(request: &HttpRequest) -> Option<AuthLevel> {
    let authorization = request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)?
        .ok()?;
    if let Ok(service_token) = env::var("SERVICE_API_TOKEN") {
        if !service_token.is_empty() && authorization == service_token {
            return Some(AuthLevel::Service);
        }
    }
    let secret = env::var("SESSION_SECRET").ok()?;
    verify_token(authorization, &secret).map(AuthLevel::Partner)
}

fn sign(name: &str, issued_at: i64, secret: &str) -> Vec<u8> {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}:{}", name, issued_at).as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    hex.chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|pair| u8::from_str_radix(&String::from_iter(pair), 16))
        .collect::<Result<Vec<u8>, ParseIntError>>()
        .ok()
}
