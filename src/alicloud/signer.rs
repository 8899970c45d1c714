//! POP RPC request signing (signature version 1.0, HMAC-SHA1)

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::BTreeMap;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const SIGNATURE_VERSION: &str = "1.0";

/// Percent-encode per RFC 3986, keeping only `A-Z a-z 0-9 - _ . ~`
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Sorted `key=value` pairs joined with `&`, both sides percent-encoded
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(method: &str, canonical_query: &str) -> String {
    format!(
        "{}&{}&{}",
        method,
        percent_encode("/"),
        percent_encode(canonical_query)
    )
}

/// Base64 HMAC-SHA1 of `string_to_sign`, keyed with `secret + "&"`
pub fn sign(secret: &str, string_to_sign: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(format!("{}&", secret).as_bytes())
        .context("Failed to initialize HMAC-SHA1")?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Query string for a GET request, with the `Signature` parameter appended
pub fn signed_query(params: &BTreeMap<String, String>, secret: &str) -> Result<String> {
    let canonical = canonical_query(params);
    let signature = sign(secret, &string_to_sign("GET", &canonical))?;
    Ok(format!("{}&Signature={}", canonical, percent_encode(&signature)))
}
