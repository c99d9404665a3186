pub mod endpoint;
pub mod error;
pub mod request;
pub mod response;

use crate::coordinator::Fetch;
use crate::model;
use async_trait::async_trait;
pub use error::Error;
use reqwest::header::{self, HeaderMap, HeaderValue};
use response::{Bv, GraphqlResponse};
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub fn api(api_url: String, credentials: model::Credentials, timeout_secs: u64) -> model::Api {
    model::Api {
        api_url: api_url.trim_end_matches('/').to_owned(),
        credentials,
        timeout_secs,
    }
}

/// Headers the provider's own web client sends. The API is not meant for third parties, so
/// look like a browser.
fn default_headers(api_url: &str) -> Result<HeaderMap, Error> {
    let referer = format!("{}{}", api_url, endpoint::LOGIN_PAGE);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7,de;q=0.6"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(
        header::REFERER,
        HeaderValue::from_str(&referer).or(Err(Error::InternalError))?,
    );
    Ok(headers)
}

/// Map Non-200 API response to Error
fn map_api_err(error: reqwest::Error) -> Error {
    match error.status() {
        Some(http::StatusCode::TOO_MANY_REQUESTS) => Error::RateExceeded(error.to_string()),
        Some(http::StatusCode::UNAUTHORIZED) | Some(http::StatusCode::FORBIDDEN) => {
            Error::LoginError(error.to_string())
        }
        _ => Error::ApiError(error.to_string()),
    }
}

fn unexpected(reason: &str) -> Error {
    Error::UnexpectedApiResponse(reason.to_string())
}

/// Open a session. Authentication is HTTP basic with the escaped password; the session itself
/// lives in the cookies kept by the returned client.
pub async fn login(api: &model::Api) -> Result<model::LoggedInApi, Error> {
    let client = reqwest::ClientBuilder::new()
        .cookie_store(true)
        .default_headers(default_headers(&api.api_url)?)
        .timeout(Duration::from_secs(api.timeout_secs))
        .build()
        .or(Err(Error::InternalError))?;
    let url = format!("{}{}", api.api_url, endpoint::LOGIN);

    let response = client
        .get(url)
        .basic_auth(
            &api.credentials.username,
            Some(&api.credentials.password),
        )
        .send()
        .await
        .map_err(map_api_err)?
        .error_for_status()
        .map_err(map_api_err)?;

    log::debug!(
        "Logged in as {} (server responded {})",
        api.credentials.username,
        response.status()
    );

    Ok(model::LoggedInApi {
        api_url: api.api_url.to_owned(),
        client,
    })
}

/// Walk `[0].data.me.billingAccounts[0].agreements[0].bv`. Every missing level, empty list
/// included, is an unexpected response.
fn extract_bv(response: GraphqlResponse) -> Result<Bv, Error> {
    let payload = match response {
        GraphqlResponse::Batch(payloads) => payloads
            .into_iter()
            .next()
            .ok_or_else(|| unexpected("empty batch"))?,
        GraphqlResponse::Single(payload) => payload,
    };

    let messages = payload
        .errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    let data = match payload.data {
        Some(data) => data,
        None if !messages.is_empty() => return Err(Error::ApiError(messages)),
        None => return Err(unexpected("no data")),
    };
    if !messages.is_empty() {
        log::warn!("GraphQL answered with data and errors: {}", messages);
    }

    data.me
        .ok_or_else(|| unexpected("no user"))?
        .billing_accounts
        .and_then(|accounts| accounts.into_iter().next())
        .ok_or_else(|| unexpected("no billing account"))?
        .agreements
        .and_then(|agreements| agreements.into_iter().next())
        .ok_or_else(|| unexpected("no agreement"))?
        .bv
        .ok_or_else(|| unexpected("no virtual battery"))
}

/// Read the virtual battery of the first agreement of the first billing account.
pub async fn battery(api: &model::LoggedInApi) -> Result<model::BatteryRecord, Error> {
    let url = format!("{}{}", api.api_url, endpoint::GRAPHQL);

    let response_text = api
        .client
        .post(url)
        .json(&request::battery_query())
        .send()
        .await
        .map_err(map_api_err)?
        .error_for_status()
        .map_err(map_api_err)?
        .text()
        .await
        .map_err(|e| Error::ApiError(format!("Error reading API response: {}", e)))?;

    log::trace!(
        "endpoint: {}, response_text: {}",
        endpoint::GRAPHQL,
        response_text
    );

    let response = serde_json::from_str::<GraphqlResponse>(&response_text)
        .map_err(|e| Error::InvalidResponse(response_text.clone(), e.to_string()))?;

    extract_bv(response).map(|bv| model::BatteryRecord {
        current_charge: bv.current_charge,
        total_injection: bv.total_injection,
        start_date: bv.start_date,
        update_date: bv.update_date,
    })
}

/// Log in and read the battery. Each call uses a fresh session.
pub async fn fetch(api: &model::Api) -> Result<model::BatteryRecord, Error> {
    let logged_in_api = login(api).await?;
    battery(&logged_in_api).await
}

#[async_trait]
impl Fetch for model::Api {
    async fn fetch(&self) -> Result<model::BatteryRecord, Error> {
        fetch(self).await
    }
}
