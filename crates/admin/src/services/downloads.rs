//! Signed, expiring download links for product files.
//!
//! A link carries the seller, customer and expiry in its query string and an
//! HMAC-SHA256 over all of them plus the file ID. Nothing is stored
//! server-side; a link is valid exactly when its signature checks out and
//! its expiry has not passed.

use chrono::{DateTime, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use url::Url;

use shelfkeeper_core::{CustomerId, ProductFileId, SellerId};

type HmacSha256 = Hmac<Sha256>;

/// Why a download link was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("download link has expired")]
    Expired,
    #[error("download link signature is invalid")]
    BadSignature,
}

/// The query string of a download link.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkParams {
    pub seller: SellerId,
    pub customer: CustomerId,
    /// Unix seconds.
    pub expires: i64,
    /// Hex-encoded HMAC.
    pub sig: String,
}

/// A freshly issued link.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadLink {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies download links.
#[derive(Clone)]
pub struct DownloadSigner {
    keyed: HmacSha256,
    ttl: chrono::Duration,
}

impl std::fmt::Debug for DownloadSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadSigner")
            .field("keyed", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl DownloadSigner {
    /// Key a signer with `key`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLength` if the HMAC implementation rejects the key.
    pub fn new(key: &SecretString, ttl: chrono::Duration) -> Result<Self, InvalidLength> {
        let keyed = HmacSha256::new_from_slice(key.expose_secret().as_bytes())?;
        Ok(Self { keyed, ttl })
    }

    #[must_use]
    pub const fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    fn mac(
        &self,
        seller: SellerId,
        file: ProductFileId,
        customer: CustomerId,
        expires: i64,
    ) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(format!("{seller}:{file}:{customer}:{expires}").as_bytes());
        mac
    }

    /// Hex signature for the given link fields.
    #[must_use]
    pub fn sign(
        &self,
        seller: SellerId,
        file: ProductFileId,
        customer: CustomerId,
        expires: i64,
    ) -> String {
        hex::encode(self.mac(seller, file, customer, expires).finalize().into_bytes())
    }

    /// Build a link to `file` for `customer` valid from `now` for the configured TTL.
    #[must_use]
    pub fn link(
        &self,
        base_url: &Url,
        seller: SellerId,
        file: ProductFileId,
        customer: CustomerId,
        now: DateTime<Utc>,
    ) -> DownloadLink {
        let expires_at = now + self.ttl;
        let expires = expires_at.timestamp();
        let sig = self.sign(seller, file, customer, expires);

        let mut url = base_url.clone();
        url.set_path(&format!("/downloads/{file}"));
        url.query_pairs_mut()
            .clear()
            .append_pair("seller", &seller.to_string())
            .append_pair("customer", &customer.to_string())
            .append_pair("expires", &expires.to_string())
            .append_pair("sig", &sig);

        DownloadLink {
            url: url.into(),
            expires_at,
        }
    }

    /// Check a presented link.
    ///
    /// The signature comparison runs in constant time.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::BadSignature` if any field was altered and
    /// `LinkError::Expired` once `now` has reached the expiry.
    pub fn verify(
        &self,
        file: ProductFileId,
        params: &LinkParams,
        now: DateTime<Utc>,
    ) -> Result<(), LinkError> {
        let presented = hex::decode(&params.sig).map_err(|_| LinkError::BadSignature)?;
        self.mac(params.seller, file, params.customer, params.expires)
            .verify_slice(&presented)
            .map_err(|_| LinkError::BadSignature)?;

        if now.timestamp() >= params.expires {
            return Err(LinkError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use chrono::TimeZone;

    use super::*;

    fn signer() -> DownloadSigner {
        DownloadSigner::new(
            &SecretString::from("k3y-for-tests-only-0123456789abcdef"),
            chrono::Duration::minutes(15),
        )
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn params_from(link: &DownloadLink) -> (ProductFileId, LinkParams) {
        let url = Url::parse(&link.url).unwrap();
        let file = url.path().trim_start_matches("/downloads/").parse().unwrap();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let field = |name: &str| query.get(name).unwrap().clone();
        let params = LinkParams {
            seller: field("seller").parse().unwrap(),
            customer: field("customer").parse().unwrap(),
            expires: field("expires").parse().unwrap(),
            sig: field("sig"),
        };
        (file, params)
    }

    #[test]
    fn test_issued_link_verifies_until_expiry() {
        let base = Url::parse("https://desk.example.com").unwrap();
        let link = signer().link(
            &base,
            SellerId::generate(),
            ProductFileId::generate(),
            CustomerId::generate(),
            now(),
        );
        assert!(link.url.starts_with("https://desk.example.com/downloads/"));
        assert_eq!(link.expires_at, now() + chrono::Duration::minutes(15));

        let (file, params) = params_from(&link);
        assert_eq!(signer().verify(file, &params, now()), Ok(()));
        assert_eq!(
            signer().verify(file, &params, link.expires_at),
            Err(LinkError::Expired)
        );
    }

    #[test]
    fn test_tampering_breaks_signature() {
        let base = Url::parse("https://desk.example.com").unwrap();
        let link = signer().link(
            &base,
            SellerId::generate(),
            ProductFileId::generate(),
            CustomerId::generate(),
            now(),
        );
        let (file, params) = params_from(&link);

        let other_customer = LinkParams {
            customer: CustomerId::generate(),
            ..params.clone()
        };
        assert_eq!(
            signer().verify(file, &other_customer, now()),
            Err(LinkError::BadSignature)
        );

        let extended = LinkParams {
            expires: params.expires + 3600,
            ..params.clone()
        };
        assert_eq!(
            signer().verify(file, &extended, now()),
            Err(LinkError::BadSignature)
        );

        assert_eq!(
            signer().verify(ProductFileId::generate(), &params, now()),
            Err(LinkError::BadSignature)
        );

        let garbage = LinkParams {
            sig: "zz".into(),
            ..params
        };
        assert_eq!(
            signer().verify(file, &garbage, now()),
            Err(LinkError::BadSignature)
        );
    }

    #[test]
    fn test_other_key_rejects() {
        let seller = SellerId::generate();
        let file = ProductFileId::generate();
        let customer = CustomerId::generate();
        let expires = (now() + chrono::Duration::minutes(5)).timestamp();
        let sig = signer().sign(seller, file, customer, expires);

        let other = DownloadSigner::new(
            &SecretString::from("a-different-key-entirely-987654321"),
            chrono::Duration::minutes(15),
        )
        .unwrap();
        let params = LinkParams {
            seller,
            customer,
            expires,
            sig,
        };
        assert_eq!(
            other.verify(file, &params, now()),
            Err(LinkError::BadSignature)
        );
    }
}
