//! Parsing and comparison for `did:sage:<chain>:<address>` identifiers.

use std::fmt;

use crate::core::error::SageError;

/// A chain namespace recognized inside a SAGE DID.
///
/// Unrecognized chain segments are preserved verbatim via `Other` rather
/// than rejected outright - the registry, not this crate, owns the set of
/// chains that are actually provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Chain {
    /// `did:sage:ethereum:...`
    Ethereum,
    /// `did:sage:kaia:...`
    Kaia,
    /// `did:sage:solana:...`
    Solana,
    /// Any other chain segment, lowercased.
    Other(String),
}

impl Chain {
    fn parse(segment: &str) -> Self {
        match segment.to_ascii_lowercase().as_str() {
            "ethereum" => Chain::Ethereum,
            "kaia" => Chain::Kaia,
            "solana" => Chain::Solana,
            other => Chain::Other(other.to_string()),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Kaia => "kaia",
            Chain::Solana => "solana",
            Chain::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `did:sage:<chain>:<address>` identifier.
///
/// Address comparison is case-insensitive since most chains
/// represent addresses as hex strings that tolerate either case; the
/// canonical form kept here is lowercase.
#[derive(Debug, Clone, Eq)]
pub struct AgentDid {
    chain: Chain,
    address: String,
    raw: String,
}

impl AgentDid {
    /// Parse a `did:sage:<chain>:<address>` string.
    pub fn parse(s: &str) -> Result<Self, SageError> {
        let mut parts = s.splitn(4, ':');
        let scheme = parts.next().unwrap_or("");
        let method = parts.next().unwrap_or("");
        let chain = parts.next().unwrap_or("");
        let address = parts.next().unwrap_or("");

        if scheme != "did" || method != "sage" || chain.is_empty() || address.is_empty() {
            return Err(SageError::InvalidDid(s.to_string()));
        }

        Ok(Self {
            chain: Chain::parse(chain),
            address: address.to_ascii_lowercase(),
            raw: s.to_string(),
        })
    }

    /// The chain namespace.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// The lowercased address segment.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The original DID string as parsed.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for AgentDid {
    fn eq(&self, other: &Self) -> bool {
        self.chain == other.chain && self.address == other.address
    }
}

impl std::hash::Hash for AgentDid {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.chain.hash(state);
        self.address.hash(state);
    }
}

impl fmt::Display for AgentDid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:sage:{}:{}", self.chain, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_did() {
        let did = AgentDid::parse("did:sage:ethereum:0xAAA111").unwrap();
        assert_eq!(did.chain(), &Chain::Ethereum);
        assert_eq!(did.address(), "0xaaa111");
    }

    #[test]
    fn rejects_wrong_method() {
        assert!(AgentDid::parse("did:key:ethereum:0xAAA").is_err());
    }

    #[test]
    fn rejects_missing_segments() {
        assert!(AgentDid::parse("did:sage:ethereum").is_err());
        assert!(AgentDid::parse("did:sage:").is_err());
    }

    #[test]
    fn address_comparison_is_case_insensitive() {
        let a = AgentDid::parse("did:sage:ethereum:0xAAA111").unwrap();
        let b = AgentDid::parse("did:sage:ethereum:0xaaa111").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_chain_is_preserved() {
        let did = AgentDid::parse("did:sage:polygon:0xCCC").unwrap();
        assert_eq!(did.chain(), &Chain::Other("polygon".to_string()));
        assert_eq!(did.to_string(), "did:sage:polygon:0xccc");
    }
}
