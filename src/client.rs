//! Small HTTP client helpers over one shared `reqwest` client.
//!
//! ```rust,no_run
//! use easierweb::client;
//!
//! # async fn demo() -> easierweb::Result<()> {
//! let (code, body) = client::get("http://127.0.0.1:8080/members/1", None).await?;
//! println!("{code}: {body}");
//! # Ok(())
//! # }
//! ```

use std::sync::OnceLock;

use crate::data::Data;
use crate::error::Result;
use crate::method::Method;
use crate::params::Params;

fn shared() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(reqwest::Client::new)
}

/// Sends a request and reads the whole response body. Every entry in
/// `header` is set on the request, replacing any previous value.
pub async fn request(method: Method, url: &str, body: Option<Data>, header: Option<&Params>) -> Result<(u16, Data)> {
    let mut req = shared().request(method.into(), url);
    if let Some(header) = header {
        for (key, value) in header.iter() {
            req = req.header(key, value);
        }
    }
    if let Some(body) = body {
        req = req.body(body.into_vec());
    }
    let res = req.send().await?;
    let code = res.status().as_u16();
    let bytes = res.bytes().await?;
    Ok((code, Data::from(bytes)))
}

pub async fn get(url: &str, header: Option<&Params>) -> Result<(u16, Data)> {
    request(Method::Get, url, None, header).await
}

pub async fn head(url: &str, header: Option<&Params>) -> Result<(u16, Data)> {
    request(Method::Head, url, None, header).await
}

pub async fn options(url: &str, header: Option<&Params>) -> Result<(u16, Data)> {
    request(Method::Options, url, None, header).await
}

pub async fn post(url: &str, body: impl Into<Data>, header: Option<&Params>) -> Result<(u16, Data)> {
    request(Method::Post, url, Some(body.into()), header).await
}

pub async fn put(url: &str, body: impl Into<Data>, header: Option<&Params>) -> Result<(u16, Data)> {
    request(Method::Put, url, Some(body.into()), header).await
}

pub async fn patch(url: &str, body: impl Into<Data>, header: Option<&Params>) -> Result<(u16, Data)> {
    request(Method::Patch, url, Some(body.into()), header).await
}

pub async fn delete(url: &str, header: Option<&Params>) -> Result<(u16, Data)> {
    request(Method::Delete, url, None, header).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn unreachable_host_is_a_client_error() {
        // Port 9 (discard) on loopback is closed on test machines.
        let err = get("http://127.0.0.1:9/", None).await.unwrap_err();
        assert!(matches!(err, Error::Client(_)), "{err}");
    }

    #[tokio::test]
    async fn invalid_url_is_a_client_error() {
        let err = post("not a url", "x", None).await.unwrap_err();
        assert!(matches!(err, Error::Client(_)), "{err}");
    }
}
