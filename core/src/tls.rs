//! TLS trust material validation

use crate::condition::{
    Condition, REASON_INVALID_TLS_CONFIG, REASON_SUCCESS, TYPE_TLS_CONFIGURATION_VALID,
};
use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rustls::RootCertStore;
use rustls_pemfile::Item;
use serde::{Deserialize, Serialize};

/// Optional TLS block of an upstream declaration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsSpec {
    /// Base64 encoded PEM bundle of trusted CA certificates
    #[serde(default)]
    pub certificate_authority_data: String,
}

/// Outcome of validating the TLS block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsValidation {
    pub condition: Condition,
    /// Decoded PEM bundle, set only when CA data was supplied and valid
    pub ca_bundle: Option<Vec<u8>>,
}

/// Validate an upstream's optional TLS block
pub fn validate_tls_config(tls: Option<&TlsSpec>) -> TlsValidation {
    let Some(tls) = tls else {
        return TlsValidation {
            condition: Condition::success(
                TYPE_TLS_CONFIGURATION_VALID,
                REASON_SUCCESS,
                "no TLS configuration provided",
            ),
            ca_bundle: None,
        };
    };

    if tls.certificate_authority_data.is_empty() {
        return loaded(None);
    }

    let bundle = match decode_ca_data(&tls.certificate_authority_data) {
        Ok(bundle) => bundle,
        Err(e) => return invalid(e.to_string()),
    };

    if let Err(e) = root_store_from_pem(&bundle) {
        return invalid(e.to_string());
    }

    loaded(Some(bundle))
}

fn loaded(ca_bundle: Option<Vec<u8>>) -> TlsValidation {
    TlsValidation {
        condition: Condition::success(
            TYPE_TLS_CONFIGURATION_VALID,
            REASON_SUCCESS,
            "loaded TLS configuration",
        ),
        ca_bundle,
    }
}

fn invalid(detail: String) -> TlsValidation {
    TlsValidation {
        condition: Condition::failure(
            TYPE_TLS_CONFIGURATION_VALID,
            REASON_INVALID_TLS_CONFIG,
            format!("certificateAuthorityData is invalid: {}", detail),
        ),
        ca_bundle: None,
    }
}

/// Decode standard base64, ignoring line breaks
fn decode_ca_data(data: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let unwrapped: String = data.chars().filter(|c| *c != '\r' && *c != '\n').collect();
    STANDARD.decode(unwrapped)
}

/// DER certificates found in a PEM bundle.
///
/// Malformed blocks and blocks of other types are skipped.
pub fn parse_certificates(pem: &[u8]) -> Vec<Vec<u8>> {
    let mut reader = pem;
    let mut certs = Vec::new();
    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(der))) => certs.push(der),
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => tracing::debug!("Skipping malformed PEM block in CA bundle: {}", e),
        }
    }
    certs
}

/// Build a root store from a PEM bundle, failing if it holds no usable certificate
pub fn root_store_from_pem(pem: &[u8]) -> Result<RootCertStore> {
    let certs = parse_certificates(pem);
    let mut roots = RootCertStore::empty();
    let (valid, invalid) = roots.add_parsable_certificates(&certs);
    if valid == 0 {
        return Err(Error::NoCertificates);
    }
    if invalid > 0 {
        tracing::debug!("Skipped {} unparsable certificates in CA bundle", invalid);
    }
    Ok(roots)
}
