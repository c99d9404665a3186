use chrono::NaiveDateTime;
use chrono_tz::Tz;

pub type KWh = f64;

/// Zone of the provider's wall-clock date-times. Every `NaiveDateTime` in a `BatteryRecord` is
/// local time in this zone.
pub const PROVIDER_TZ: Tz = chrono_tz::Europe::Paris;

/// Account credentials. The password is kept form-escaped, the way the provider's login
/// endpoint expects it inside the basic auth header.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.to_owned(),
            password: escape_password(password),
        }
    }
}

/* Never print the password, even escaped */
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Form encoding: like percent encoding, except that space becomes `+`.
fn escape_password(password: &str) -> String {
    password
        .split(' ')
        .map(|part| urlencoding::encode(part).into_owned())
        .collect::<Vec<_>>()
        .join("+")
}

#[derive(Debug, Clone)]
pub struct Api {
    pub api_url: String,
    pub credentials: Credentials,
    pub timeout_secs: u64,
}

#[derive(Debug)]
pub struct LoggedInApi {
    pub api_url: String,
    pub client: reqwest::Client,
}

/// Snapshot of the virtual battery as reported by one successful fetch.
///
/// Fields the provider left out (or sent in a shape we cannot read) are `None`; the record
/// itself only exists when the `bv` object was reachable.
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryRecord {
    pub current_charge: Option<KWh>,
    pub total_injection: Option<KWh>,
    pub start_date: Option<NaiveDateTime>,
    pub update_date: Option<NaiveDateTime>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn password_is_form_escaped() {
        let credentials = Credentials::new("jean@example.com", "p@ss word/&=+");
        assert_eq!("jean@example.com", credentials.username);
        assert_eq!("p%40ss+word%2F%26%3D%2B", credentials.password);
    }

    #[test]
    fn plain_password_is_unchanged() {
        assert_eq!("Secret123", Credentials::new("u", "Secret123").password);
    }

    #[test]
    fn debug_hides_password() {
        let output = format!("{:?}", Credentials::new("u", "hunter2"));
        assert!(!output.contains("hunter2"));
    }
}
