// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::ClientBuilder;
use std::error::Error;
#[cfg(feature = "fips")]
use tracing::debug;

/// Creates a reqwest client builder trusting the platform roots plus an optional
/// PEM bundle of extra CA certificates (e.g. a private broker CA).
#[cfg(not(feature = "fips"))]
pub fn create_reqwest_client_builder(
    extra_ca_pem: Option<&[u8]>,
) -> Result<ClientBuilder, Box<dyn Error + Send + Sync>> {
    let mut builder = reqwest::Client::builder().use_rustls_tls();
    if let Some(pem) = extra_ca_pem {
        for cert in reqwest::Certificate::from_pem_bundle(pem)? {
            builder = builder.add_root_certificate(cert);
        }
    }
    Ok(builder)
}

/// Creates a reqwest client builder with a FIPS-compliant TLS configuration.
/// Native roots are loaded first, then any extra CA certificates from `extra_ca_pem`.
#[cfg(feature = "fips")]
pub fn create_reqwest_client_builder(
    extra_ca_pem: Option<&[u8]>,
) -> Result<ClientBuilder, Box<dyn Error + Send + Sync>> {
    use rustls::pki_types::{pem::PemObject, CertificateDer};

    // The provider must already be installed, e.g. with
    // rustls::crypto::default_fips_provider().install_default()
    let provider =
        rustls::crypto::CryptoProvider::get_default().ok_or("No crypto provider configured")?;

    if !provider.fips() {
        return Err("Crypto provider is not FIPS-compliant".into());
    }

    let mut root_cert_store = rustls::RootCertStore::empty();
    let mut valid_count = 0;
    for cert in rustls_native_certs::load_native_certs().certs {
        match root_cert_store.add(cert) {
            Ok(()) => valid_count += 1,
            Err(err) => debug!("Failed to parse native certificate: {:?}", err),
        }
    }
    if let Some(pem) = extra_ca_pem {
        for cert in CertificateDer::pem_slice_iter(pem) {
            let cert = cert.map_err(|e| format!("Invalid CA certificate: {e:?}"))?;
            root_cert_store
                .add(cert)
                .map_err(|e| format!("Failed to add CA certificate: {e:?}"))?;
            valid_count += 1;
        }
    }
    if valid_count == 0 {
        return Err("No valid root certificates available".into());
    }

    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(rustls::ALL_VERSIONS)
        .map_err(|_| "Failed to set protocol versions")?
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();

    if !config.fips() {
        return Err("The final TLS configuration is not FIPS-compliant".into());
    }
    debug!("Client builder is configured with FIPS.");

    Ok(reqwest::Client::builder().use_preconfigured_tls(config))
}
