//! Package signing, OIDC claim inspection, and signature policy enforcement.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64_URL};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use pantry_types::{
    OidcClaims, PantryError, PolicyResult, ProvenanceDigest, ProvenanceStatement, ProvenanceSubject,
    Result, Signature, SignaturePolicy, PolicyLevel, TrustedPublisher, SLSA_PREDICATE_TYPE,
};
use pantry_workspace::glob_match;
use sha2::{Digest, Sha256};

/// SHA-256 digest of a package body, rendered as lowercase hex.
pub fn digest_hex(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Signs `data` with an Ed25519 key expanded from a 32-byte seed.
pub fn sign(data: &[u8], seed: &[u8; 32], key_id: impl Into<String>, signed_at: i64) -> Signature {
    let signing_key = SigningKey::from_bytes(seed);
    let signature = signing_key.sign(data);
    Signature {
        algorithm: Signature::ALGORITHM.to_string(),
        key_id: key_id.into(),
        signature_b64: BASE64.encode(signature.to_bytes()),
        signed_at,
    }
}

/// A registry of known public keys, addressed by caller-supplied key id.
#[derive(Debug, Clone, Default)]
pub struct Keyring {
    keys: HashMap<String, String>,
}

impl Keyring {
    pub fn new() -> Keyring {
        Keyring::default()
    }

    /// Registers a PEM-encoded Ed25519 public key under `key_id`. A
    /// sensible default `key_id` is the base64url of the public key bytes.
    pub fn add_key(&mut self, key_id: impl Into<String>, public_key_pem: impl Into<String>) {
        self.keys.insert(key_id.into(), public_key_pem.into());
    }

    pub fn find(&self, key_id: &str) -> Option<&str> {
        self.keys.get(key_id).map(String::as_str)
    }
}

/// Derives a default key id from a public key: the base64url of its bytes.
pub fn default_key_id(public_key: &VerifyingKey) -> String {
    BASE64_URL.encode(public_key.to_bytes())
}

fn parse_public_key_pem(pem: &str) -> Result<VerifyingKey> {
    let body: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let bytes = BASE64
        .decode(body.trim())
        .map_err(|e| PantryError::SignatureVerificationFailed(format!("invalid PEM body: {e}")))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| PantryError::SignatureVerificationFailed("public key is not 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&array)
        .map_err(|e| PantryError::SignatureVerificationFailed(format!("invalid public key: {e}")))
}

/// Verifies `signature` over `data` against a key resolved from `keyring`.
pub fn verify(data: &[u8], signature: &Signature, keyring: &Keyring) -> Result<()> {
    let pem = keyring
        .find(&signature.key_id)
        .ok_or_else(|| PantryError::UntrustedKey(signature.key_id.clone()))?;
    let public_key = parse_public_key_pem(pem)?;

    let sig_bytes = BASE64
        .decode(&signature.signature_b64)
        .map_err(|e| PantryError::SignatureVerificationFailed(format!("invalid signature encoding: {e}")))?;
    let sig_array: [u8; 64] = sig_bytes
        .as_slice()
        .try_into()
        .map_err(|_| PantryError::SignatureVerificationFailed("signature is not 64 bytes".to_string()))?;
    let ed_signature = ed25519_dalek::Signature::from_bytes(&sig_array);

    public_key
        .verify(data, &ed_signature)
        .map_err(|_| PantryError::SignatureVerificationFailed(signature.key_id.clone()))
}

/// A decoded (unverified) OIDC token: header and payload, parsed without
/// checking the signature segment.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub header: serde_json::Value,
    pub claims: OidcClaims,
}

/// Parses the three base64url segments of a JWT and JSON-decodes the
/// header and payload. Does NOT verify the signature segment; intended for
/// local claim inspection or flows where the registry verifies the
/// signature out of band.
pub fn decode_token_unsafe(jwt: &str) -> Result<DecodedToken> {
    let mut parts = jwt.split('.');
    let header_b64 = parts
        .next()
        .ok_or_else(|| PantryError::InvalidManifest("malformed JWT: missing header".to_string()))?;
    let payload_b64 = parts
        .next()
        .ok_or_else(|| PantryError::InvalidManifest("malformed JWT: missing payload".to_string()))?;
    if parts.next().is_none() {
        return Err(PantryError::InvalidManifest("malformed JWT: missing signature segment".to_string()));
    }

    let header_bytes = BASE64_URL
        .decode(header_b64)
        .map_err(|e| PantryError::InvalidManifest(format!("invalid JWT header encoding: {e}")))?;
    let payload_bytes = BASE64_URL
        .decode(payload_b64)
        .map_err(|e| PantryError::InvalidManifest(format!("invalid JWT payload encoding: {e}")))?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes)
        .map_err(|e| PantryError::InvalidManifest(format!("invalid JWT header JSON: {e}")))?;
    let claims: OidcClaims = serde_json::from_slice(&payload_bytes)
        .map_err(|e| PantryError::InvalidManifest(format!("invalid JWT payload JSON: {e}")))?;

    Ok(DecodedToken { header, claims })
}

/// Fails if `now >= claims.exp`.
pub fn validate_expiration(claims: &OidcClaims, now: i64) -> Result<()> {
    if now >= claims.exp {
        return Err(PantryError::TokenExpired { exp: claims.exp, now });
    }
    Ok(())
}

/// The issuer URL GitHub Actions' OIDC provider asserts.
pub const GITHUB_ACTIONS_ISSUER: &str = "https://token.actions.githubusercontent.com";

fn expected_issuer(publisher_type: &str) -> &'static str {
    match publisher_type {
        "github-actions" => GITHUB_ACTIONS_ISSUER,
        _ => GITHUB_ACTIONS_ISSUER,
    }
}

/// Binds a validator to a single trusted OIDC publisher entry.
pub trait ValidateClaims {
    fn validate_claims(&self, claims: &OidcClaims) -> bool;
}

impl ValidateClaims for TrustedPublisher {
    fn validate_claims(&self, claims: &OidcClaims) -> bool {
        if claims.iss != expected_issuer(&self.publisher_type) {
            return false;
        }

        let expected_prefix = format!("repo:{}/{}", self.owner, self.repository);
        if !claims.sub.starts_with(&expected_prefix) {
            return false;
        }

        if !self.workflow.is_empty() {
            let matches = claims
                .workflow_ref
                .as_deref()
                .is_some_and(|w| w.contains(&self.workflow));
            if !matches {
                return false;
            }
        }

        if let Some(allowed_refs) = &self.allowed_refs {
            let matches = claims
                .git_ref
                .as_deref()
                .is_some_and(|r| allowed_refs.iter().any(|allowed| allowed == r));
            if !matches {
                return false;
            }
        }

        true
    }
}

/// Evaluates a [`SignaturePolicy`] against a candidate package body and an
/// optional signature, in the six-step order the policy engine defines.
pub fn enforce_policy(
    policy: &SignaturePolicy,
    pkg_name: &str,
    signature: Option<&Signature>,
    body: &[u8],
    keyring: &Keyring,
) -> PolicyResult {
    if policy.level == PolicyLevel::Off {
        return PolicyResult {
            allowed: true,
            violations: Vec::new(),
        };
    }

    if policy.exempt.iter().any(|pat| glob_match(pat, pkg_name)) {
        return PolicyResult {
            allowed: true,
            violations: Vec::new(),
        };
    }

    let mut violations = Vec::new();

    let required = policy.required_for.is_empty() && policy.level == PolicyLevel::Strict
        || policy.required_for.iter().any(|pat| glob_match(pat, pkg_name));

    let Some(signature) = signature else {
        if required {
            violations.push(format!("signature required for {pkg_name} but none was provided"));
        }
        return finalize(policy, violations);
    };

    if !policy.trusted_keys.is_empty() && !policy.trusted_keys.iter().any(|k| k == &signature.key_id) {
        violations.push(format!("key id {} is not in trusted_keys", signature.key_id));
        return finalize(policy, violations);
    }

    if let Err(e) = verify(body, signature, keyring) {
        violations.push(e.to_string());
    }

    finalize(policy, violations)
}

fn finalize(policy: &SignaturePolicy, violations: Vec<String>) -> PolicyResult {
    if violations.is_empty() {
        return PolicyResult {
            allowed: true,
            violations,
        };
    }
    match policy.level {
        PolicyLevel::Warn => PolicyResult {
            allowed: true,
            violations,
        },
        _ => PolicyResult {
            allowed: false,
            violations,
        },
    }
}

/// Builds an in-toto provenance statement bound to a package's digest.
pub fn build_provenance(package_name: &str, digest: &str) -> ProvenanceStatement {
    ProvenanceStatement {
        statement_type: "https://in-toto.io/Statement/v0.1".to_string(),
        subject: vec![ProvenanceSubject {
            name: package_name.to_string(),
            digest: ProvenanceDigest {
                sha256: digest.to_string(),
            },
        }],
        predicate_type: SLSA_PREDICATE_TYPE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pem_for(key: &VerifyingKey) -> String {
        format!(
            "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n",
            BASE64.encode(key.to_bytes())
        )
    }

    #[test]
    fn digest_is_lowercase_hex_sha256() {
        let d = digest_hex(b"hello");
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let seed = [7u8; 32];
        let signing_key = SigningKey::from_bytes(&seed);
        let public_key = signing_key.verifying_key();

        let body = b"package body bytes";
        let sig = sign(body, &seed, "key-1", 1_700_000_000);

        let mut keyring = Keyring::new();
        keyring.add_key("key-1", pem_for(&public_key));

        assert!(verify(body, &sig, &keyring).is_ok());
    }

    #[test]
    fn verify_fails_for_unknown_key_id() {
        let seed = [1u8; 32];
        let sig = sign(b"data", &seed, "missing-key", 0);
        let keyring = Keyring::new();
        let err = verify(b"data", &sig, &keyring).unwrap_err();
        assert!(matches!(err, PantryError::UntrustedKey(_)));
    }

    #[test]
    fn verify_fails_for_tampered_body() {
        let seed = [3u8; 32];
        let signing_key = SigningKey::from_bytes(&seed);
        let public_key = signing_key.verifying_key();
        let sig = sign(b"original", &seed, "k", 0);

        let mut keyring = Keyring::new();
        keyring.add_key("k", pem_for(&public_key));

        let err = verify(b"tampered", &sig, &keyring).unwrap_err();
        assert!(matches!(err, PantryError::SignatureVerificationFailed(_)));
    }

    fn sample_jwt() -> String {
        let header = BASE64_URL.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let claims = OidcClaims {
            iss: GITHUB_ACTIONS_ISSUER.to_string(),
            sub: "repo:acme/widgets:ref:refs/heads/main".to_string(),
            aud: "pantry".to_string(),
            exp: 2_000_000_000,
            iat: 1_900_000_000,
            workflow_ref: Some("acme/widgets/.github/workflows/publish.yml@refs/heads/main".to_string()),
            git_ref: Some("refs/heads/main".to_string()),
            ..Default::default()
        };
        let payload = BASE64_URL.encode(serde_json::to_vec(&claims).unwrap());
        format!("{header}.{payload}.unverified-signature")
    }

    #[test]
    fn decode_token_unsafe_does_not_check_signature() {
        let jwt = sample_jwt();
        let decoded = decode_token_unsafe(&jwt).unwrap();
        assert_eq!(decoded.claims.iss, GITHUB_ACTIONS_ISSUER);
        assert_eq!(decoded.claims.sub, "repo:acme/widgets:ref:refs/heads/main");
    }

    #[test]
    fn validate_expiration_rejects_now_at_or_after_exp() {
        let claims = OidcClaims {
            exp: 100,
            ..Default::default()
        };
        assert!(validate_expiration(&claims, 100).is_err());
        assert!(validate_expiration(&claims, 101).is_err());
        assert!(validate_expiration(&claims, 99).is_ok());
    }

    #[test]
    fn trusted_publisher_validates_claims_fully() {
        let jwt = sample_jwt();
        let claims = decode_token_unsafe(&jwt).unwrap().claims;

        let publisher = TrustedPublisher {
            publisher_type: "github-actions".to_string(),
            owner: "acme".to_string(),
            repository: "widgets".to_string(),
            workflow: "publish.yml".to_string(),
            environment: None,
            allowed_refs: Some(vec!["refs/heads/main".to_string()]),
        };
        assert!(publisher.validate_claims(&claims));

        let wrong_owner = TrustedPublisher {
            owner: "someone-else".to_string(),
            ..publisher.clone()
        };
        assert!(!wrong_owner.validate_claims(&claims));

        let wrong_ref = TrustedPublisher {
            allowed_refs: Some(vec!["refs/heads/release".to_string()]),
            ..publisher
        };
        assert!(!wrong_ref.validate_claims(&claims));
    }

    #[test]
    fn policy_off_always_allows() {
        let policy = SignaturePolicy {
            level: PolicyLevel::Off,
            required_for: vec![],
            exempt: vec![],
            trusted_keys: vec![],
        };
        let result = enforce_policy(&policy, "anything", None, b"body", &Keyring::new());
        assert!(result.allowed);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn policy_exempt_bypasses_required_signature() {
        let policy = SignaturePolicy {
            level: PolicyLevel::Strict,
            required_for: vec![],
            exempt: vec!["trusted-*".to_string()],
            trusted_keys: vec![],
        };
        let result = enforce_policy(&policy, "trusted-pkg", None, b"body", &Keyring::new());
        assert!(result.allowed);
    }

    #[test]
    fn policy_strict_rejects_missing_signature() {
        let policy = SignaturePolicy {
            level: PolicyLevel::Strict,
            required_for: vec![],
            exempt: vec![],
            trusted_keys: vec![],
        };
        let result = enforce_policy(&policy, "pkg", None, b"body", &Keyring::new());
        assert!(!result.allowed);
        assert_eq!(result.violations.len(), 1);
    }

    #[test]
    fn policy_warn_downgrades_violations_to_allow() {
        let policy = SignaturePolicy {
            level: PolicyLevel::Warn,
            required_for: vec!["*".to_string()],
            exempt: vec![],
            trusted_keys: vec![],
        };
        let result = enforce_policy(&policy, "pkg", None, b"body", &Keyring::new());
        assert!(result.allowed);
        assert!(!result.violations.is_empty());
    }

    #[test]
    fn policy_valid_signature_is_allowed() {
        let seed = [9u8; 32];
        let signing_key = SigningKey::from_bytes(&seed);
        let public_key = signing_key.verifying_key();
        let body = b"pkg body";
        let sig = sign(body, &seed, "k1", 0);

        let mut keyring = Keyring::new();
        keyring.add_key("k1", pem_for(&public_key));

        let policy = SignaturePolicy {
            level: PolicyLevel::Strict,
            required_for: vec!["*".to_string()],
            exempt: vec![],
            trusted_keys: vec!["k1".to_string()],
        };
        let result = enforce_policy(&policy, "pkg", Some(&sig), body, &keyring);
        assert!(result.allowed);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn policy_untrusted_key_id_is_a_violation() {
        let seed = [9u8; 32];
        let sig = sign(b"body", &seed, "not-listed", 0);
        let policy = SignaturePolicy {
            level: PolicyLevel::Strict,
            required_for: vec!["*".to_string()],
            exempt: vec![],
            trusted_keys: vec!["k1".to_string()],
        };
        let result = enforce_policy(&policy, "pkg", Some(&sig), b"body", &Keyring::new());
        assert!(!result.allowed);
    }

    #[test]
    fn provenance_statement_is_bound_to_digest() {
        let stmt = build_provenance("widgets", "abc123");
        assert_eq!(stmt.predicate_type, SLSA_PREDICATE_TYPE);
        assert_eq!(stmt.subject[0].name, "widgets");
        assert_eq!(stmt.subject[0].digest.sha256, "abc123");
    }
}
