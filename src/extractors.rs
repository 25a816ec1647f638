use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use rusqlite::params;

use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller, resolved from a bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Extractor that requires authentication.
/// Returns 401 if the Authorization header is missing or the token is
/// unknown or expired.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;

        let conn = state.db.get()?;
        conn.query_row(
            "SELECT u.id, u.email, u.name FROM sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.expires_at > datetime('now')",
            params![token],
            |row| {
                Ok(CurrentUser {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                })
            },
        )
        .map_err(|_| AppError::Unauthorized)
    }
}

/// Optional caller extractor — anonymous reads get None instead of 401.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(_) => Ok(MaybeUser(None)),
        }
    }
}

pub fn extract_bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn headers_with_auth(value: Option<&str>) -> axum::http::HeaderMap {
        let mut builder = Request::builder().uri("/");
        if let Some(v) = value {
            builder = builder.header(header::AUTHORIZATION, v);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        parts.headers
    }

    #[test]
    fn extracts_bearer_token() {
        let headers = headers_with_auth(Some("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn missing_header_yields_none() {
        let headers = headers_with_auth(None);
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn non_bearer_scheme_yields_none() {
        let headers = headers_with_auth(Some("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn empty_token_yields_none() {
        let headers = headers_with_auth(Some("Bearer   "));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
