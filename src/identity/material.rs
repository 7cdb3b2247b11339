//! PEM certificate and private key parsing

use super::legacy;
use crate::{Error, Result};
use pkcs8::der::asn1::AnyRef;
use pkcs8::der::{Decode, Tag, Tagged};
use pkcs8::{EncryptedPrivateKeyInfo, PrivateKeyInfo};
use rustls_pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
};

const WRONG_PASSPHRASE: &str = "could not decrypt private key (wrong passphrase?)";

/// How a PEM label encodes its private key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFormat {
    /// `PRIVATE KEY`
    Pkcs8,
    /// `ENCRYPTED PRIVATE KEY`
    EncryptedPkcs8,
    /// `RSA PRIVATE KEY`, possibly with OpenSSL encryption headers
    Pkcs1,
    /// `EC PRIVATE KEY`, possibly with OpenSSL encryption headers
    Sec1,
}

impl KeyFormat {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "PRIVATE KEY" => Some(Self::Pkcs8),
            "ENCRYPTED PRIVATE KEY" => Some(Self::EncryptedPkcs8),
            "RSA PRIVATE KEY" => Some(Self::Pkcs1),
            "EC PRIVATE KEY" => Some(Self::Sec1),
            _ => None,
        }
    }
}

fn is_certificate(label: &str) -> bool {
    matches!(label, "CERTIFICATE" | "X509 CERTIFICATE")
}

/// Client certificate chain and private key presented during the TLS handshake
pub struct ClientIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl ClientIdentity {
    /// Load an identity from PEM material holding one or more certificates and a
    /// private key, in any order.
    ///
    /// Encrypted keys (`ENCRYPTED PRIVATE KEY`, or a PKCS#1/SEC1 key carrying
    /// `Proc-Type: 4,ENCRYPTED`) are decrypted with `passphrase`. Unencrypted keys
    /// ignore it.
    ///
    /// # Errors
    ///
    /// * [`Error::Certificate`] if the material is not PEM, no certificate is present,
    ///   or one does not decode
    /// * [`Error::KeyMaterial`] if no key is present, the passphrase is wrong, or the
    ///   key does not decode
    pub fn from_pem(material: &str, passphrase: &str) -> Result<Self> {
        let sections = ::pem::parse_many(material)
            .map_err(|e| Error::Certificate(format!("invalid PEM: {}", e)))?;

        let mut chain = Vec::new();
        let mut key = None;

        for section in &sections {
            let label = section.tag();
            if is_certificate(label) {
                chain.push(parse_certificate(section)?);
            } else if let Some(format) = KeyFormat::from_label(label) {
                if key.is_some() {
                    tracing::debug!(label, "ignoring additional private key");
                    continue;
                }
                key = Some(parse_key(section, format, passphrase)?);
            } else {
                tracing::trace!(label, "skipping unrelated PEM section");
            }
        }

        if chain.is_empty() {
            return Err(Error::Certificate(
                "no CERTIFICATE section found in certificate material".into(),
            ));
        }

        let key = key.ok_or_else(|| {
            Error::KeyMaterial("no private key section found in certificate material".into())
        })?;

        tracing::debug!(certificates = chain.len(), "client identity loaded");
        Ok(Self { chain, key })
    }

    /// Certificate chain, leaf first
    pub fn certificate_chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// Leaf certificate
    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.chain[0]
    }

    /// Private key (decrypted)
    pub fn private_key(&self) -> &PrivateKeyDer<'static> {
        &self.key
    }

    /// Consume into the pieces rustls expects
    pub fn into_parts(self) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        (self.chain, self.key)
    }
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("certificates", &self.chain.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Require `der` to be exactly one DER SEQUENCE
fn expect_sequence(der: &[u8]) -> std::result::Result<(), String> {
    let any = AnyRef::from_der(der).map_err(|e| format!("invalid DER: {}", e))?;
    if any.tag() != Tag::Sequence {
        return Err(format!("expected SEQUENCE, found {}", any.tag()));
    }
    Ok(())
}

fn parse_certificate(section: &::pem::Pem) -> Result<CertificateDer<'static>> {
    if section.contents().is_empty() {
        return Err(Error::Certificate(format!(
            "empty '{}' section",
            section.tag()
        )));
    }

    // X.509 is a single DER SEQUENCE
    expect_sequence(section.contents()).map_err(Error::Certificate)?;

    Ok(CertificateDer::from(section.contents().to_vec()))
}

fn parse_key(
    section: &::pem::Pem,
    format: KeyFormat,
    passphrase: &str,
) -> Result<PrivateKeyDer<'static>> {
    let label = section.tag();

    if format == KeyFormat::EncryptedPkcs8 {
        return decrypt_pkcs8(section.contents(), passphrase);
    }

    let headers = section.headers();
    let der = if legacy::is_encrypted(headers.get(legacy::PROC_TYPE)) {
        let plain = legacy::decrypt(
            label,
            headers.get(legacy::DEK_INFO),
            section.contents(),
            passphrase,
        )?;

        // Padding can line up by chance under a wrong passphrase
        expect_sequence(&plain).map_err(|_| Error::KeyMaterial(WRONG_PASSPHRASE.into()))?;
        tracing::debug!(label, "decrypted OpenSSL-encrypted private key");
        plain
    } else {
        section.contents().to_vec()
    };

    if der.is_empty() {
        return Err(Error::KeyMaterial(format!("empty '{}' section", label)));
    }

    Ok(match format {
        KeyFormat::Pkcs1 => PrivateKeyDer::Pkcs1(PrivatePkcs1KeyDer::from(der)),
        KeyFormat::Sec1 => PrivateKeyDer::Sec1(PrivateSec1KeyDer::from(der)),
        KeyFormat::Pkcs8 | KeyFormat::EncryptedPkcs8 => {
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(der))
        }
    })
}

fn decrypt_pkcs8(der: &[u8], passphrase: &str) -> Result<PrivateKeyDer<'static>> {
    if passphrase.is_empty() {
        return Err(Error::KeyMaterial(
            "private key is encrypted but no passphrase was given".into(),
        ));
    }

    let encrypted = EncryptedPrivateKeyInfo::try_from(der)
        .map_err(|e| Error::KeyMaterial(format!("invalid encrypted key: {}", e)))?;

    let decrypted = encrypted
        .decrypt(passphrase)
        .map_err(|_| Error::KeyMaterial(WRONG_PASSPHRASE.into()))?;

    // Padding can line up by chance under a wrong passphrase
    PrivateKeyInfo::try_from(decrypted.as_bytes())
        .map_err(|_| Error::KeyMaterial(WRONG_PASSPHRASE.into()))?;

    Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        decrypted.as_bytes().to_vec(),
    )))
}
