use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::AppError;

/// JSON body that has been deserialized and passed its `validator` rules.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            tracing::debug!("rejected body: {}", e);
            AppError::validation(format!("Malformed request body: {}", e.body_text()))
        })?;
        value.validate().map_err(|e| {
            tracing::debug!("invalid body: {}", e);
            AppError::validation(format!("Invalid request: {}", e))
        })?;
        Ok(ValidatedJson(value))
    }
}

/// Parses a `YYYY-MM-DD` field.
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::validation(format!("{field} must be a YYYY-MM-DD date")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates() {
        assert_eq!(
            parse_date("start_date", "2024-09-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()
        );
        for bad in ["2024-13-01", "01/09/2024", "", "2024-02-30"] {
            match parse_date("start_date", bad) {
                Err(AppError::Validation(message)) => {
                    assert_eq!(message, "start_date must be a YYYY-MM-DD date")
                }
                other => panic!("{bad}: unexpected {other:?}"),
            }
        }
    }
}
