use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::Client;

pub const APP_USER_AGENT: &str = concat!("VoxelLauncher/", env!("CARGO_PKG_VERSION"));

pub fn build_http_client(timeout_secs: u64) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    // Range requests and sha1 checks need the raw bytes as stored on the server.
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(Duration::from_secs(timeout_secs))
        .read_timeout(Duration::from_secs(timeout_secs))
        .build()
}
