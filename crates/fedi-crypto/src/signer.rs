use std::fmt;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::Utc;
use fedi_types::{Account, KeyAlgorithm, KeyMaterial, ServiceUrls};
use http::header::{AUTHORIZATION, DATE, HOST};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use tracing::debug;

use crate::error::{SignError, SignResult};
use crate::identity::{actor_iri, key_id};

/// Headers covered by an HTTP signature, in signing order.
pub const SIGNED_HEADERS: &str = "(request-target) host date";

const SIGNATURE: HeaderName = HeaderName::from_static("signature");

/// RSA-SHA256 HTTP message signer bound to one actor key.
pub struct HttpSigner {
    key_id: String,
    key: SigningKey<Sha256>,
}

impl HttpSigner {
    pub fn new(key_id: impl Into<String>, key: RsaPrivateKey) -> Self {
        Self {
            key_id: key_id.into(),
            key: SigningKey::<Sha256>::new(key),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Add `Date`, `Host` and `Signature` headers to a request.
    pub fn sign(&self, method: &Method, uri: &Uri, headers: &mut HeaderMap) -> SignResult<()> {
        if !headers.contains_key(DATE) {
            let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
            headers.insert(DATE, header_value(&date)?);
        }
        if !headers.contains_key(HOST) {
            let host = uri
                .authority()
                .map(|a| a.as_str().to_string())
                .ok_or_else(|| SignError::Header(format!("{uri} has no host")))?;
            headers.insert(HOST, header_value(&host)?);
        }

        let signing_string = signing_string(method, uri, headers)?;
        let signature = self.key.sign(signing_string.as_bytes());
        let value = format!(
            "keyId=\"{}\",algorithm=\"rsa-sha256\",headers=\"{}\",signature=\"{}\"",
            self.key_id,
            SIGNED_HEADERS,
            B64.encode(signature.to_bytes())
        );
        headers.insert(SIGNATURE, header_value(&value)?);
        Ok(())
    }
}

impl fmt::Debug for HttpSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HttpSigner({}, <redacted>)", self.key_id)
    }
}

/// Per-request signing bound to one identity's credentials.
#[derive(Debug)]
pub enum RequestSigner {
    /// Logged-out callers; signing is a no-op.
    Anonymous,
    /// OAuth bearer token of a local account.
    Bearer(String),
    /// HTTP signature with a federated account's key.
    HttpSignature(HttpSigner),
}

impl RequestSigner {
    /// Bind signing to an account.
    ///
    /// Local accounts with a token use it as a bearer credential; otherwise an
    /// `id-rsa` key signs the request. Any other key algorithm fails with
    /// [`SignError::UnsupportedAlgorithm`] instead of producing an unsigned
    /// request.
    pub fn for_account(account: &Account, urls: &ServiceUrls) -> SignResult<Self> {
        if account.is_anonymous() {
            return Ok(Self::Anonymous);
        }
        if !account.is_logged() {
            return Err(SignError::Unauthorized(account.handle.clone()));
        }

        let token = account
            .metadata
            .oauth_token
            .clone()
            .filter(|t| !t.is_empty());
        let key = account.metadata.key.as_ref().filter(|k| !k.private.is_empty());
        match (token, key) {
            (Some(token), _) if !account.federated => Ok(Self::Bearer(token)),
            (_, Some(key)) => {
                let signer = http_signer(key, &key_id(&actor_iri(account, urls)))?;
                debug!(handle = %account.handle, key_id = %signer.key_id, "signing with actor key");
                Ok(Self::HttpSignature(signer))
            }
            (Some(token), None) => Ok(Self::Bearer(token)),
            (None, None) => Err(SignError::Unauthorized(account.handle.clone())),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Apply the credentials to an outgoing request's headers.
    pub fn sign(&self, method: &Method, uri: &Uri, headers: &mut HeaderMap) -> SignResult<()> {
        match self {
            Self::Anonymous => Ok(()),
            Self::Bearer(token) => {
                headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
                Ok(())
            }
            Self::HttpSignature(signer) => signer.sign(method, uri, headers),
        }
    }
}

/// Read a PKCS#8 PEM private key into account key material.
pub fn key_material_from_pem(pem: &str) -> SignResult<KeyMaterial> {
    let key = RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| SignError::InvalidKey(e.to_string()))?;
    let private = key
        .to_pkcs8_der()
        .map_err(|e| SignError::InvalidKey(e.to_string()))?;
    let public = key
        .to_public_key()
        .to_public_key_der()
        .map_err(|e| SignError::InvalidKey(e.to_string()))?;
    Ok(KeyMaterial {
        algorithm: KeyAlgorithm::Rsa,
        public: public.as_bytes().to_vec(),
        private: private.as_bytes().to_vec(),
    })
}

fn http_signer(key: &KeyMaterial, key_id: &str) -> SignResult<HttpSigner> {
    match key.algorithm {
        KeyAlgorithm::Rsa => {
            let private = RsaPrivateKey::from_pkcs8_der(&key.private)
                .map_err(|e| SignError::InvalidKey(e.to_string()))?;
            Ok(HttpSigner::new(key_id, private))
        }
        ref other => Err(SignError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn signing_string(method: &Method, uri: &Uri, headers: &HeaderMap) -> SignResult<String> {
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let mut lines = vec![format!(
        "(request-target): {} {}",
        method.as_str().to_ascii_lowercase(),
        target
    )];
    for name in [HOST, DATE] {
        let value = headers
            .get(&name)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| SignError::Header(format!("missing {name}")))?;
        lines.push(format!("{}: {}", name.as_str(), value.trim()));
    }
    Ok(lines.join("\n"))
}

fn header_value(value: &str) -> SignResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| SignError::Header(e.to_string()))
}
