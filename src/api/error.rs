use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::fmt;
use std::io::Cursor;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Error {
    LoginError(String),
    ApiError(String),
    RateExceeded(String),
    /// Body that could not be decoded, and why
    InvalidResponse(String, String),
    UnexpectedApiResponse(String),
    /// The fetch did not finish within this bound
    Timeout(Duration),
    /// A refresh ended without a record
    UpdateFailed(Box<Error>),
    /// The first refresh failed, nothing was set up
    NotReady(Box<Error>),
    FormatError,
    InternalError,
}

impl Error {
    /// The provider-side cause, looking through coordinator wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::UpdateFailed(e) | Error::NotReady(e) => e.root(),
            _ => self,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::LoginError(s) => write!(f, "login failed: {}", s),
            Error::ApiError(s) => write!(f, "API error: {}", s),
            Error::RateExceeded(s) => write!(f, "rate exceeded: {}", s),
            Error::InvalidResponse(body, reason) => {
                write!(f, "invalid API response ({}): {}", reason, body)
            }
            Error::UnexpectedApiResponse(s) => write!(f, "unexpected API response: {}", s),
            Error::Timeout(bound) => write!(f, "no answer from API within {:?}", bound),
            Error::UpdateFailed(e) => write!(f, "update failed: {}", e),
            Error::NotReady(e) => write!(f, "not ready: {}", e),
            Error::FormatError => write!(f, "format error"),
            Error::InternalError => write!(f, "internal error"),
        }
    }
}

impl std::error::Error for Error {}

fn html(status: Status, body: String) -> response::Result<'static> {
    Response::build()
        .status(status)
        .sized_body(body.len(), Cursor::new(body))
        .header(ContentType::new("text", "html"))
        .ok()
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        match self.root() {
            Error::RateExceeded(s) => html(
                Status::TooManyRequests,
                format!("<html><body><h3>429 Too Many Requests</h3>Downstream API response: <code>{}</code></body></html>", s),
            ),
            Error::LoginError(s) => html(
                Status::Forbidden,
                format!("<html><body><h3>403 Forbidden</h3>Error while authenticating to downstream API: <code>{}</code></body></html>", s),
            ),
            Error::ApiError(_)
            | Error::InvalidResponse(..)
            | Error::UnexpectedApiResponse(_)
            | Error::Timeout(_) => html(
                Status::BadGateway,
                format!("<html><body><h3>502 Bad Gateway</h3><code>{}</code></body></html>", self),
            ),
            _ => html(
                Status::InternalServerError,
                format!(
                    "<html><body><h3>Unknown exception</h3><code>{:?}</code></body></html>",
                    self
                ),
            ),
        }
    }
}
