use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Field order signed on the outbound payment form.
pub const OUTBOUND_SIGNED_FIELDS: &str = "total_amount,transaction_uuid,product_code";

/// HMAC-SHA256 signer keyed with the merchant secret.
#[derive(Clone)]
pub struct SignatureGenerator {
    secret: String,
}

impl SignatureGenerator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Standard base64 of the HMAC-SHA256 digest of `message`.
    pub fn sign(&self, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(message.as_bytes());
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Signs `fields` in order, joined as `k=v,k=v`.
    pub fn sign_fields(&self, fields: &[(&str, &str)]) -> String {
        self.sign(&signing_string(fields))
    }

    pub fn verify(&self, message: &str, signature: &str) -> bool {
        constant_time_eq(&self.sign(message), signature)
    }
}

/// Joins `(name, value)` pairs as `name=value` separated by commas.
pub fn signing_string(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(",")
}

pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SANDBOX_SECRET: &str = "8gBm/:&EnhH.1/q";

    #[test]
    fn matches_known_digest() {
        let signer = SignatureGenerator::new("S");
        assert_eq!(
            signer.sign("total_amount=129.98,transaction_uuid=abc,product_code=EPAYTEST"),
            "nnd+k2mchRQsVyIhQYtmIOb52Uhbl1lNN+5EiJqW1gc="
        );
    }

    #[test]
    fn matches_gateway_sandbox_sample() {
        let signer = SignatureGenerator::new(SANDBOX_SECRET);
        let sig = signer.sign_fields(&[
            ("total_amount", "100"),
            ("transaction_uuid", "11-201-13"),
            ("product_code", "EPAYTEST"),
        ]);
        assert_eq!(sig, "5DZywcrTKD0gia/rsSMcrRHmJl+4Tbol6S+lWgdJ94E=");
    }

    #[test]
    fn signing_string_preserves_field_order() {
        assert_eq!(
            signing_string(&[("b", "2"), ("a", "1")]),
            "b=2,a=1".to_string()
        );
        assert_eq!(signing_string(&[]), "");
    }

    #[test]
    fn verify_rejects_altered_signature() {
        let signer = SignatureGenerator::new(SANDBOX_SECRET);
        let sig = signer.sign("payload");
        assert!(signer.verify("payload", &sig));
        assert!(!signer.verify("payload!", &sig));
        assert!(!signer.verify("payload", &sig[1..]));
    }

    #[test]
    fn constant_time_eq_compares_exactly() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
