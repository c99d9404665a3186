pub type Endpoint = str;

pub const LOGIN: &Endpoint = "/api/login";
pub const GRAPHQL: &Endpoint = "/api/graphql";
/* Sent as referer, the provider's web client logs in from this page */
pub const LOGIN_PAGE: &Endpoint = "/connexion";
