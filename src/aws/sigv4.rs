//! AWS Signature Version 4
//!
//! Signs REST requests with `host;x-amz-date[;x-amz-security-token]` as the
//! signed header set. The payload hash covers the exact body bytes sent.

use super::auth::Credentials;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// A request to sign
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    /// Percent-encoded path as it goes on the wire
    pub path: &'a str,
    /// Query pairs, unencoded
    pub query: &'a [(String, String)],
    pub body: &'a [u8],
}

/// Headers to attach to the signed request
#[derive(Debug, Clone)]
pub struct SigningOutput {
    pub authorization: String,
    pub amz_date: String,
    pub security_token: Option<String>,
}

pub fn sign(
    request: &SignableRequest<'_>,
    credentials: &Credentials,
    region: &str,
    service: &str,
    now: DateTime<Utc>,
) -> SigningOutput {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let mut headers = vec![
        ("host".to_string(), request.host.trim().to_string()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort();

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical = canonical_request(request, &canonical_headers, &signed_headers);
    let scope = format!("{date}/{region}/{service}/aws4_request");
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical.as_bytes()))
    );

    let key = signing_key(&credentials.secret_access_key, &date, region, service);
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));

    SigningOutput {
        authorization: format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        ),
        amz_date,
        security_token: credentials.session_token.clone(),
    }
}

fn canonical_request(
    request: &SignableRequest<'_>,
    canonical_headers: &str,
    signed_headers: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        canonical_uri(request.path),
        canonical_query(request.query),
        canonical_headers,
        signed_headers,
        hex::encode(Sha256::digest(request.body))
    )
}

/// Non-S3 services expect every path segment encoded a second time
fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical_query(query: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| {
            (
                urlencoding::encode(k).into_owned(),
                urlencoding::encode(v).into_owned(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn example_credentials() -> Credentials {
        Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
    }

    #[test]
    fn test_signing_key_matches_published_example() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_get_vanilla() {
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let request = SignableRequest {
            method: "GET",
            host: "example.amazonaws.com",
            path: "/",
            query: &[],
            body: b"",
        };
        let out = sign(&request, &example_credentials(), "us-east-1", "service", now);
        assert_eq!(out.amz_date, "20150830T123600Z");
        assert_eq!(
            out.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
    }

    #[test]
    fn test_session_token_is_signed() {
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let mut creds = example_credentials();
        creds.session_token = Some("token".to_string());
        let request = SignableRequest {
            method: "GET",
            host: "example.amazonaws.com",
            path: "/",
            query: &[],
            body: b"",
        };
        let out = sign(&request, &creds, "us-east-1", "service", now);
        assert!(out
            .authorization
            .contains("SignedHeaders=host;x-amz-date;x-amz-security-token"));
        assert_eq!(out.security_token.as_deref(), Some("token"));
    }

    #[test]
    fn test_canonical_uri_double_encodes() {
        // An ARN segment is already encoded once on the wire
        let path = "/tags/arn%3Aaws%3Am2%3Aus-east-1%3A1%3Aapp%2Fx";
        assert_eq!(
            canonical_uri(path),
            "/tags/arn%253Aaws%253Am2%253Aus-east-1%253A1%253Aapp%252Fx"
        );
    }

    #[test]
    fn test_canonical_query_sorted() {
        let query = vec![
            ("tagKeys".to_string(), "b".to_string()),
            ("tagKeys".to_string(), "a".to_string()),
            ("maxResults".to_string(), "50".to_string()),
        ];
        assert_eq!(
            canonical_query(&query),
            "maxResults=50&tagKeys=a&tagKeys=b"
        );
    }
}
