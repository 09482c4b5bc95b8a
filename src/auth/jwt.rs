use std::str::FromStr;

use crate::{
    error::AppError,
    model::{role::Role, user::UserStatus},
    models::{Claims, UserSql},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

pub fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

/// Builds claims carrying the full profile of a stored user.
pub fn claims_for(user: &UserSql, issued_at: usize, ttl: usize) -> Result<Claims, AppError> {
    let role = Role::from_str(&user.role)
        .map_err(|_| anyhow::anyhow!("user {} has unknown role {:?}", user.id, user.role))?;
    let status = UserStatus::from_str(&user.status)
        .map_err(|_| anyhow::anyhow!("user {} has unknown status {:?}", user.id, user.status))?;

    Ok(Claims {
        sub: user.email.clone(),
        user_id: user.id,
        name: user.name.clone(),
        role,
        status,
        phone: user.phone.clone(),
        bank_name: user.bank_name.clone(),
        bank_account_number: user.bank_account_number.clone(),
        wallet_a_number: user.wallet_a_number.clone(),
        wallet_b_number: user.wallet_b_number.clone(),
        iat: issued_at,
        exp: issued_at + ttl,
        jti: Uuid::new_v4().to_string(),
    })
}

pub fn encode_claims(claims: &Claims, secret: &str) -> Result<String, Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn issue_session(user: &UserSql, secret: &str, ttl: usize) -> Result<(String, Claims), AppError> {
    let claims = claims_for(user, now(), ttl)?;
    let token = encode_claims(&claims, secret)?;
    Ok((token, claims))
}

pub fn needs_refresh(claims: &Claims, at: usize, update_age: usize) -> bool {
    at.saturating_sub(claims.iat) >= update_age
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}
