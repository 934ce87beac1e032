//! RFC 9421 component canonicalization and signature-base construction.
//! No registry-fetched crate implements structured-field parsing for HTTP
//! Message Signatures, so the fixed component list and parameter set this
//! core actually needs is hand-built rather than pulled from a generic
//! RFC 9421 library, in the claims-then-canonical-bytes style of a
//! header-based request-signing layer.

use std::fmt::Write as _;

use crate::core::constants::SIGNATURE_PARAMS_COMPONENT;
use crate::core::error::HttpSigError;

/// One HTTP message component covered by a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    /// `@method`, uppercased.
    Method,
    /// `@path`: the URI path, plus `?query` when a query string is present.
    Path,
    /// `@authority`: the `Host` header value, lowercased.
    Authority,
    /// `@request-target`: `"<lowercased method> <path[?query]>"`.
    RequestTarget,
    /// A named header; repeated headers join with `", "` in appearance order.
    Header(String),
}

impl Component {
    /// The component's name as it appears in a signature-input component list.
    pub fn name(&self) -> String {
        match self {
            Component::Method => "@method".to_string(),
            Component::Path => "@path".to_string(),
            Component::Authority => "@authority".to_string(),
            Component::RequestTarget => "@request-target".to_string(),
            Component::Header(name) => name.to_ascii_lowercase(),
        }
    }

    /// Parse a component name back into its typed form.
    pub fn parse(name: &str) -> Result<Self, HttpSigError> {
        Ok(match name {
            "@method" => Component::Method,
            "@path" => Component::Path,
            "@authority" => Component::Authority,
            "@request-target" => Component::RequestTarget,
            other if other.starts_with('@') => return Err(HttpSigError::MalformedSignature),
            other => Component::Header(other.to_string()),
        })
    }
}

/// Owned request metadata extracted from an [`http`] crate request, for
/// callers already built on that ecosystem (most web frameworks use
/// `http::request::Parts` or something convertible to it). Borrow an
/// [`HttpRequestMeta`] view from this with [`Self::as_request_meta`].
#[derive(Debug, Clone)]
pub struct OwnedRequestMeta {
    /// The request method.
    pub method: String,
    /// The URI path, without the query string.
    pub path: String,
    /// The URI query string, without the leading `?`.
    pub query: Option<String>,
    /// The resolved authority: the URI's own authority if present,
    /// otherwise the `Host` header.
    pub authority: String,
    /// Headers in order of appearance; non-UTF-8 values are dropped.
    pub headers: Vec<(String, String)>,
}

impl OwnedRequestMeta {
    /// Extract method, path, query, authority, and headers from `parts`.
    pub fn from_http_parts(parts: &http::request::Parts) -> Self {
        let authority = parts
            .uri
            .authority()
            .map(|a| a.to_string())
            .or_else(|| parts.headers.get(http::header::HOST).and_then(|v| v.to_str().ok()).map(str::to_string))
            .unwrap_or_default();
        let headers = parts
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        Self {
            method: parts.method.as_str().to_string(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            authority,
            headers,
        }
    }

    /// Borrow an [`HttpRequestMeta`] view over this owned data.
    pub fn as_request_meta(&self) -> HttpRequestMeta<'_> {
        HttpRequestMeta {
            method: &self.method,
            path: &self.path,
            query: self.query.as_deref(),
            authority: &self.authority,
            headers: &self.headers,
        }
    }
}

/// The minimal request shape a signature base is computed over; callers
/// adapt whatever HTTP library or framework they use into this.
#[derive(Debug, Clone)]
pub struct HttpRequestMeta<'a> {
    /// The request method (e.g. `POST`).
    pub method: &'a str,
    /// The URI path, without the query string.
    pub path: &'a str,
    /// The URI query string, without the leading `?`.
    pub query: Option<&'a str>,
    /// The `Host`/`:authority` value.
    pub authority: &'a str,
    /// Headers in order of appearance; repeated names are joined per RFC 9421.
    pub headers: &'a [(String, String)],
}

impl<'a> HttpRequestMeta<'a> {
    fn path_and_query(&self) -> String {
        match self.query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.to_string(),
        }
    }

    /// Look up a header's canonicalized value (lowercased name, trimmed and
    /// obs-fold-collapsed values, repeats joined by `", "`).
    pub fn header_value(&self, name: &str) -> Option<String> {
        let values: Vec<String> = self
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| canonicalize_header_value(v))
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    fn component_value(&self, component: &Component) -> Option<String> {
        match component {
            Component::Method => Some(self.method.to_ascii_uppercase()),
            Component::Path => Some(self.path_and_query()),
            Component::Authority => Some(self.authority.to_ascii_lowercase()),
            Component::RequestTarget => {
                Some(format!("{} {}", self.method.to_ascii_lowercase(), self.path_and_query()))
            }
            Component::Header(name) => self.header_value(name),
        }
    }
}

/// Collapses obs-fold (CRLF followed by whitespace) to a single space and
/// trims leading/trailing ASCII whitespace.
fn canonicalize_header_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_was_space = false;
    for ch in value.chars() {
        if ch == '\r' || ch == '\n' {
            continue;
        }
        if ch == ' ' || ch == '\t' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim_matches(' ').to_string()
}

/// The `@signature-params` parameters: the signer's chosen covered
/// components plus `created`/`keyid`/`alg`/`nonce`.
#[derive(Debug, Clone)]
pub struct SignatureParams {
    /// Unix timestamp the signature was created at.
    pub created: i64,
    /// Identifies the verification key: a session key id or a DID.
    pub keyid: String,
    /// RFC 9421 algorithm label (`hmac-sha256`, `ed25519`, `ecdsa-p256-sha256`).
    pub alg: String,
    /// Present iff this signature is also checked against the Nonce Cache.
    pub nonce: Option<String>,
}

impl SignatureParams {
    /// Serialize as the inner-list-plus-parameters form used both inside the
    /// signature base's final line and in the `Signature-Input` header.
    pub fn serialized(&self, components: &[Component]) -> String {
        let names = components
            .iter()
            .map(|c| format!("\"{}\"", c.name()))
            .collect::<Vec<_>>()
            .join(" ");
        let mut out = format!("({names});created={}", self.created);
        write!(out, ";keyid=\"{}\"", self.keyid).expect("String write is infallible");
        write!(out, ";alg=\"{}\"", self.alg).expect("String write is infallible");
        if let Some(nonce) = &self.nonce {
            write!(out, ";nonce=\"{nonce}\"").expect("String write is infallible");
        }
        out
    }
}

/// Build the signature base: one `"<name>": <value>` line per
/// covered component, in the signer's chosen order, followed by a final
/// `"@signature-params": <serialized>` line with no trailing newline.
pub fn build_signature_base(
    request: &HttpRequestMeta,
    components: &[Component],
    params: &SignatureParams,
) -> Result<String, HttpSigError> {
    let mut base = String::new();
    for component in components {
        let value = request
            .component_value(component)
            .ok_or(HttpSigError::MalformedSignature)?;
        writeln!(base, "\"{}\": {}", component.name(), value).expect("String write is infallible");
    }
    write!(base, "\"{SIGNATURE_PARAMS_COMPONENT}\": {}", params.serialized(components))
        .expect("String write is infallible");
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_request<'a>(headers: &'a [(String, String)]) -> HttpRequestMeta<'a> {
        HttpRequestMeta {
            method: "post",
            path: "/v1/messages",
            query: Some("id=1"),
            authority: "Agent.Example.Com",
            headers,
        }
    }

    #[test]
    fn derived_components_canonicalize() {
        let headers = vec![];
        let request = sample_request(&headers);
        assert_eq!(
            request.component_value(&Component::Method),
            Some("POST".to_string())
        );
        assert_eq!(
            request.component_value(&Component::Path),
            Some("/v1/messages?id=1".to_string())
        );
        assert_eq!(
            request.component_value(&Component::Authority),
            Some("agent.example.com".to_string())
        );
        assert_eq!(
            request.component_value(&Component::RequestTarget),
            Some("post /v1/messages?id=1".to_string())
        );
    }

    #[test]
    fn repeated_headers_join_in_order() {
        let headers = vec![
            ("X-Trace".to_string(), "a".to_string()),
            ("x-trace".to_string(), "b".to_string()),
        ];
        let request = sample_request(&headers);
        assert_eq!(request.header_value("x-trace"), Some("a, b".to_string()));
    }

    #[test]
    fn signature_base_is_deterministic_for_fixed_component_order() {
        let headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        let request = sample_request(&headers);
        let components = vec![Component::Method, Component::Path, Component::Header("content-type".into())];
        let params = SignatureParams {
            created: 1000,
            keyid: "sess-1".into(),
            alg: "hmac-sha256".into(),
            nonce: None,
        };

        let a = build_signature_base(&request, &components, &params).unwrap();
        let b = build_signature_base(&request, &components, &params).unwrap();
        assert_eq!(a, b);
        assert!(a.ends_with("\"@signature-params\": (\"@method\" \"@path\" \"content-type\");created=1000;keyid=\"sess-1\";alg=\"hmac-sha256\""));
        assert!(!a.ends_with('\n'));
    }

    #[test]
    fn missing_covered_header_is_malformed() {
        let headers = vec![];
        let request = sample_request(&headers);
        let components = vec![Component::Header("content-digest".into())];
        let params = SignatureParams {
            created: 1000,
            keyid: "sess-1".into(),
            alg: "hmac-sha256".into(),
            nonce: None,
        };
        assert!(build_signature_base(&request, &components, &params).is_err());
    }

    #[test]
    fn owned_request_meta_extracts_from_http_parts() {
        let request = http::Request::builder()
            .method("POST")
            .uri("https://agent.example.com/v1/messages?id=1")
            .header("content-type", "application/json")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();

        let owned = OwnedRequestMeta::from_http_parts(&parts);
        let meta = owned.as_request_meta();

        assert_eq!(meta.component_value(&Component::Method), Some("POST".to_string()));
        assert_eq!(meta.component_value(&Component::Path), Some("/v1/messages?id=1".to_string()));
        assert_eq!(meta.component_value(&Component::Authority), Some("agent.example.com".to_string()));
        assert_eq!(meta.header_value("content-type"), Some("application/json".to_string()));
    }

    proptest! {
        #[test]
        fn header_value_canonicalization_is_idempotent(value in ".*") {
            let once = canonicalize_header_value(&value);
            let twice = canonicalize_header_value(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
