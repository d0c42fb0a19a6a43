//! Signed URLs for backends without native presigning.
//!
//! URL shape: `{base_url}/signed/{key}?{extra params}&expires={unix_ts}&signature={sig}`.
//! `sig = base64url(HMAC-SHA256(secret, "{METHOD}\n{key}\n{expires}\n{k=v&...}"))` with the
//! extra parameters sorted by name. The HTTP method is part of the signature, so a GET URL
//! cannot be replayed as a PUT.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use vidlift_core::constants::DEFAULT_CONTENT_TYPE;
use vidlift_core::models::SignedMethod;

use crate::multipart::part_etag;
use crate::range::parse_range_header;
use crate::traits::{Storage, StorageError, StorageResult};

type HmacSha256 = Hmac<Sha256>;

/// Query parameter naming the multipart upload a signed part URL belongs to.
pub const UPLOAD_ID_PARAM: &str = "uploadId";
/// Query parameter carrying the one-based part number (S3 convention).
pub const PART_NUMBER_PARAM: &str = "partNumber";

const EXPIRES_PARAM: &str = "expires";
const SIGNATURE_PARAM: &str = "signature";

/// Extra signed parameters scoping a PUT URL to one part of a multipart upload.
pub fn part_params(upload_id: &str, index: u32) -> Vec<(&'static str, String)> {
    vec![
        (UPLOAD_ID_PARAM, upload_id.to_string()),
        (PART_NUMBER_PARAM, (index + 1).to_string()),
    ]
}

fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// HMAC signer for coordinator-served signed URLs.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Arc<Vec<u8>>,
    base_url: String,
}

impl fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    /// `base_url` is the externally reachable API root, e.g. `http://localhost:4000/api/v0`.
    pub fn new(secret: impl AsRef<[u8]>, base_url: impl Into<String>) -> Self {
        UrlSigner {
            secret: Arc::new(secret.as_ref().to_vec()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a signed URL valid for `expires_in` from now.
    pub fn sign(
        &self,
        method: SignedMethod,
        key: &str,
        expires_in: Duration,
        extra: &[(&str, String)],
    ) -> String {
        let expires = Utc::now().timestamp() + expires_in.as_secs() as i64;
        self.sign_until(method, key, expires, extra)
    }

    fn sign_until(
        &self,
        method: SignedMethod,
        key: &str,
        expires: i64,
        extra: &[(&str, String)],
    ) -> String {
        let params: BTreeMap<String, String> = extra
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();

        let tag = self.mac(method, key, expires, &params).finalize().into_bytes();
        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(tag);

        let mut query: Vec<String> = params
            .iter()
            .map(|(name, value)| {
                format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
            })
            .collect();
        query.push(format!("{}={}", EXPIRES_PARAM, expires));
        query.push(format!("{}={}", SIGNATURE_PARAM, signature));

        format!(
            "{}/signed/{}?{}",
            self.base_url,
            encode_key(key),
            query.join("&")
        )
    }

    fn mac(
        &self,
        method: SignedMethod,
        key: &str,
        expires: i64,
        params: &BTreeMap<String, String>,
    ) -> HmacSha256 {
        let canonical_params = params
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&");
        let canonical = format!("{}\n{}\n{}\n{}", method.as_str(), key, expires, canonical_params);

        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(canonical.as_bytes());
        mac
    }

    /// Check signature and expiry of an incoming signed request.
    pub fn verify(&self, request: &SignedRequest) -> StorageResult<()> {
        if Utc::now().timestamp() > request.expires {
            return Err(StorageError::SignatureInvalid(
                "Signed URL has expired".to_string(),
            ));
        }

        let tag = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&request.signature)
            .map_err(|_| StorageError::SignatureInvalid("Malformed signature".to_string()))?;

        self.mac(request.method, &request.key, request.expires, &request.params)
            .verify_slice(&tag)
            .map_err(|_| StorageError::SignatureInvalid("Signature mismatch".to_string()))
    }
}

/// A request received on a signed URL, split into its signed components.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: SignedMethod,
    pub key: String,
    pub expires: i64,
    /// Extra signed parameters (everything except `expires` and `signature`)
    pub params: BTreeMap<String, String>,
    pub signature: String,
}

impl SignedRequest {
    /// Build from the decoded key path and query pairs of a signed URL.
    pub fn from_query<I>(method: SignedMethod, key: impl Into<String>, query: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = BTreeMap::new();
        let mut expires = None;
        let mut signature = None;

        for (name, value) in query {
            match name.as_str() {
                EXPIRES_PARAM => {
                    expires = Some(value.parse::<i64>().map_err(|_| {
                        StorageError::SignatureInvalid("Malformed expiry".to_string())
                    })?)
                }
                SIGNATURE_PARAM => signature = Some(value),
                _ => {
                    params.insert(name, value);
                }
            }
        }

        Ok(SignedRequest {
            method,
            key: key.into(),
            expires: expires
                .ok_or_else(|| StorageError::SignatureInvalid("Missing expiry".to_string()))?,
            params,
            signature: signature
                .ok_or_else(|| StorageError::SignatureInvalid("Missing signature".to_string()))?,
        })
    }

    /// `(upload_id, zero-based index)` when the URL targets one multipart part.
    pub fn part_target(&self) -> StorageResult<Option<(String, u32)>> {
        match (
            self.params.get(UPLOAD_ID_PARAM),
            self.params.get(PART_NUMBER_PARAM),
        ) {
            (Some(upload_id), Some(part_number)) => {
                let part_number: u32 = part_number.parse().map_err(|_| {
                    StorageError::InvalidRequest(format!("Invalid part number: {}", part_number))
                })?;
                if part_number == 0 {
                    return Err(StorageError::InvalidRequest(
                        "Part numbers start at 1".to_string(),
                    ));
                }
                Ok(Some((upload_id.clone(), part_number - 1)))
            }
            (None, None) => Ok(None),
            _ => Err(StorageError::InvalidRequest(format!(
                "{} and {} must be given together",
                UPLOAD_ID_PARAM, PART_NUMBER_PARAM
            ))),
        }
    }
}

/// Payload served for a signed GET.
#[derive(Debug, Clone)]
pub struct SignedRead {
    pub data: Bytes,
    /// Served range and total object size when the request carried a `Range` header
    pub range: Option<(Range<u64>, u64)>,
}

/// Verify and execute a signed PUT. Returns the completion token of the stored bytes.
pub async fn execute_signed_put(
    storage: &dyn Storage,
    signer: &UrlSigner,
    request: &SignedRequest,
    body: Bytes,
) -> StorageResult<String> {
    if request.method != SignedMethod::Put {
        return Err(StorageError::SignatureInvalid(
            "URL is not signed for PUT".to_string(),
        ));
    }
    signer.verify(request)?;

    match request.part_target()? {
        Some((upload_id, index)) => {
            let part = storage
                .upload_part(&request.key, &upload_id, index, body)
                .await?;
            Ok(part.etag)
        }
        None => {
            let etag = part_etag(&body);
            storage
                .put_object(&request.key, body, DEFAULT_CONTENT_TYPE)
                .await?;
            Ok(etag)
        }
    }
}

/// Verify and execute a signed GET, honouring an optional `Range` header.
pub async fn execute_signed_get(
    storage: &dyn Storage,
    signer: &UrlSigner,
    request: &SignedRequest,
    range_header: Option<&str>,
) -> StorageResult<SignedRead> {
    if request.method != SignedMethod::Get {
        return Err(StorageError::SignatureInvalid(
            "URL is not signed for GET".to_string(),
        ));
    }
    signer.verify(request)?;

    match range_header {
        Some(header) => {
            let size = storage.content_length(&request.key).await?;
            let range = parse_range_header(header, size).ok_or_else(|| {
                StorageError::InvalidRequest(format!("Malformed Range header: {}", header))
            })?;
            let data = storage.get_object_range(&request.key, range.clone()).await?;
            Ok(SignedRead {
                data,
                range: Some((range, size)),
            })
        }
        None => Ok(SignedRead {
            data: storage.get_object(&request.key).await?,
            range: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> UrlSigner {
        UrlSigner::new(b"0123456789abcdef0123456789abcdef", "http://localhost:4000/api/v0/")
    }

    /// Split a signed URL back into the pieces the HTTP layer would extract.
    fn parse(method: SignedMethod, url: &str) -> SignedRequest {
        let (path, query) = url.split_once('?').unwrap();
        let key = path.split_once("/signed/").unwrap().1;
        let key = urlencoding::decode(key).unwrap().into_owned();
        let pairs = query.split('&').map(|pair| {
            let (name, value) = pair.split_once('=').unwrap();
            (
                urlencoding::decode(name).unwrap().into_owned(),
                urlencoding::decode(value).unwrap().into_owned(),
            )
        });
        SignedRequest::from_query(method, key, pairs).unwrap()
    }

    #[test]
    fn signed_url_verifies() {
        let signer = signer();
        let url = signer.sign(
            SignedMethod::Get,
            "videos/my clip.mp4",
            Duration::from_secs(60),
            &[],
        );
        assert!(url.starts_with("http://localhost:4000/api/v0/signed/videos/my%20clip.mp4?"));
        let request = parse(SignedMethod::Get, &url);
        assert_eq!(request.key, "videos/my clip.mp4");
        assert!(signer.verify(&request).is_ok());
    }

    #[test]
    fn method_and_key_are_bound_to_signature() {
        let signer = signer();
        let url = signer.sign(SignedMethod::Get, "a.mp4", Duration::from_secs(60), &[]);

        let as_put = parse(SignedMethod::Put, &url);
        assert!(signer.verify(&as_put).is_err());

        let mut other_key = parse(SignedMethod::Get, &url);
        other_key.key = "b.mp4".to_string();
        assert!(signer.verify(&other_key).is_err());
    }

    #[test]
    fn part_params_are_signed() {
        let signer = signer();
        let url = signer.sign(
            SignedMethod::Put,
            "a.mp4",
            Duration::from_secs(60),
            &part_params("upload-1", 2),
        );
        let mut request = parse(SignedMethod::Put, &url);
        assert!(signer.verify(&request).is_ok());
        assert_eq!(
            request.part_target().unwrap(),
            Some(("upload-1".to_string(), 2))
        );

        request
            .params
            .insert(PART_NUMBER_PARAM.to_string(), "1".to_string());
        assert!(signer.verify(&request).is_err());
    }

    #[test]
    fn expired_url_is_rejected() {
        let signer = signer();
        let url = signer.sign_until(SignedMethod::Get, "a.mp4", Utc::now().timestamp() - 5, &[]);
        let err = signer.verify(&parse(SignedMethod::Get, &url)).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn other_secret_is_rejected() {
        let url = signer().sign(SignedMethod::Get, "a.mp4", Duration::from_secs(60), &[]);
        let other = UrlSigner::new(b"another-secret-another-secret-xx", "http://localhost:4000");
        assert!(other.verify(&parse(SignedMethod::Get, &url)).is_err());
    }
}
