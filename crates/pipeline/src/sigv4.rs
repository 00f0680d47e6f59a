//! AWS Signature Version 4 for single-shot JSON requests.
//!
//! Only what the CodePipeline JSON protocol needs: no query strings, no chunked
//! payloads, and header values that are already trimmed.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};

use crate::credentials::AwsCredentials;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

pub struct SigningParams<'a> {
    pub credentials: &'a AwsCredentials,
    pub region: &'a str,
    pub service: &'a str,
    pub time: DateTime<Utc>,
}

impl SigningParams<'_> {
    pub fn amz_date(&self) -> String {
        self.time.format("%Y%m%dT%H%M%SZ").to_string()
    }

    fn date_stamp(&self) -> String {
        self.time.format("%Y%m%d").to_string()
    }

    fn scope(&self) -> String {
        format!("{}/{}/{}/aws4_request", self.date_stamp(), self.region, self.service)
    }
}

/// A request described by its signed parts. Header names must be lowercase and
/// include `host` and `x-amz-date`.
pub struct CanonicalRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub headers: Vec<(&'a str, String)>,
    pub payload: &'a [u8],
}

impl CanonicalRequest<'_> {
    fn sorted_headers(&self) -> Vec<(&str, &str)> {
        let mut headers: Vec<(&str, &str)> =
            self.headers.iter().map(|(name, value)| (*name, value.trim())).collect();
        headers.sort_by(|left, right| left.0.cmp(right.0));
        headers
    }

    pub fn signed_headers(&self) -> String {
        self.sorted_headers().iter().map(|(name, _)| *name).collect::<Vec<_>>().join(";")
    }

    pub fn render(&self) -> String {
        let canonical_headers: String = self
            .sorted_headers()
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();
        let path = if self.path.is_empty() { "/" } else { self.path };

        format!(
            "{}\n{}\n\n{}\n{}\n{}",
            self.method,
            path,
            canonical_headers,
            self.signed_headers(),
            sha256_hex(self.payload)
        )
    }
}

/// Returns the `Authorization` header value for `request`.
pub fn authorization(request: &CanonicalRequest<'_>, params: &SigningParams<'_>) -> String {
    let scope = params.scope();
    let string_to_sign = format!(
        "{ALGORITHM}\n{}\n{scope}\n{}",
        params.amz_date(),
        sha256_hex(request.render().as_bytes())
    );

    let key = signing_key(
        params.credentials.secret_access_key.expose_secret(),
        &params.date_stamp(),
        params.region,
        params.service,
    );
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={}, Signature={signature}",
        params.credentials.access_key_id,
        request.signed_headers()
    )
}

pub fn signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes());
    let region_key = hmac_sha256(&date_key, region.as_bytes());
    let service_key = hmac_sha256(&region_key, service.as_bytes());
    hmac_sha256(&service_key, b"aws4_request")
}

fn hmac_sha256(key: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("hmac-sha256 accepts keys of any length"),
    };
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

pub fn sha256_hex(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{authorization, sha256_hex, signing_key, CanonicalRequest, SigningParams};
    use crate::credentials::AwsCredentials;

    const EXAMPLE_SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    #[test]
    fn derives_documented_signing_key() {
        let key = signing_key(EXAMPLE_SECRET, "20120215", "us-east-1", "iam");
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn signs_the_vanilla_get_request() {
        let credentials = AwsCredentials::new("AKIDEXAMPLE", EXAMPLE_SECRET, None);
        let params = SigningParams {
            credentials: &credentials,
            region: "us-east-1",
            service: "service",
            time: Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).single().expect("instant"),
        };
        let request = CanonicalRequest {
            method: "GET",
            path: "/",
            headers: vec![
                ("host", "example.amazonaws.com".to_owned()),
                ("x-amz-date", params.amz_date()),
            ],
            payload: b"",
        };

        assert_eq!(
            request.render(),
            "GET\n/\n\nhost:example.amazonaws.com\nx-amz-date:20150830T123600Z\n\nhost;x-amz-date\ne3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            authorization(&request, &params),
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, SignedHeaders=host;x-amz-date, Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
    }

    #[test]
    fn headers_are_sorted_and_payload_hashed() {
        let request = CanonicalRequest {
            method: "POST",
            path: "",
            headers: vec![
                ("x-amz-target", "CodePipeline_20150709.GetPipelineState".to_owned()),
                ("host", "codepipeline.us-east-1.amazonaws.com".to_owned()),
                ("content-type", "application/x-amz-json-1.1".to_owned()),
                ("x-amz-date", "20261019T000000Z".to_owned()),
            ],
            payload: br#"{"name":"backend-pipeline"}"#,
        };

        assert_eq!(request.signed_headers(), "content-type;host;x-amz-date;x-amz-target");
        let rendered = request.render();
        assert!(rendered.starts_with("POST\n/\n\ncontent-type:application/x-amz-json-1.1\n"));
        assert!(rendered.ends_with(&sha256_hex(br#"{"name":"backend-pipeline"}"#)));
    }
}
