//! MQTT integration client certificates

use crate::config::MqttClientConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rcgen::{CertificateParams, DnType, ExtendedKeyUsagePurpose, KeyPair};
use tracing::info;
use uuid::Uuid;

/// Client certificate issued for an application
#[derive(Debug, Clone)]
pub struct ClientCertificate {
    /// End of validity
    pub expires_at: DateTime<Utc>,
    /// CA certificate (PEM)
    pub ca_cert: String,
    /// Client certificate (PEM)
    pub cert: String,
    /// Client private key (PEM)
    pub key: String,
}

/// Sign a client certificate with the configured CA.
///
/// The common name is the application id, which the MQTT broker uses as
/// the client identity.
pub async fn client_cert_for_application_id(
    conf: &MqttClientConfig,
    application_id: &Uuid,
) -> Result<ClientCertificate> {
    let ca_cert_pem = tokio::fs::read_to_string(&conf.ca_cert)
        .await
        .with_context(|| format!("Read CA certificate {}", conf.ca_cert.display()))?;
    let ca_key_pem = tokio::fs::read_to_string(&conf.ca_key)
        .await
        .with_context(|| format!("Read CA key {}", conf.ca_key.display()))?;

    let ca_key = KeyPair::from_pem(&ca_key_pem).context("Parse CA key")?;
    let ca_params =
        CertificateParams::from_ca_cert_pem(&ca_cert_pem).context("Parse CA certificate")?;
    let ca = ca_params.self_signed(&ca_key).context("Load CA certificate")?;

    let lifetime = time::Duration::try_from(conf.client_cert_lifetime)
        .context("Client certificate lifetime out of range")?;
    let not_before = time::OffsetDateTime::now_utc() - time::Duration::days(1);
    let not_after = time::OffsetDateTime::now_utc() + lifetime;

    let id = application_id.to_string();
    let mut params = CertificateParams::new(vec![id.clone()])?;
    params.not_before = not_before;
    params.not_after = not_after;
    params.distinguished_name.push(DnType::CommonName, id.as_str());
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

    let key = KeyPair::generate().context("Generate client key")?;
    let cert = params
        .signed_by(&key, &ca, &ca_key)
        .context("Sign client certificate")?;

    let expires_at = DateTime::<Utc>::from_timestamp(not_after.unix_timestamp(), 0)
        .context("Certificate expiry out of range")?;

    info!(application_id = %application_id, expires_at = %expires_at, "Client certificate issued");

    Ok(ClientCertificate {
        expires_at,
        ca_cert: ca_cert_pem,
        cert: cert.pem(),
        key: key.serialize_pem(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rcgen::{BasicConstraints, IsCa};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Self-signed CA written to a temporary directory
    pub(crate) fn test_ca(dir: &TempDir) -> MqttClientConfig {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::CommonName, "netserver test CA");
        let cert = params.self_signed(&key).unwrap();

        let ca_cert = dir.path().join("ca.pem");
        let ca_key = dir.path().join("ca-key.pem");
        std::fs::write(&ca_cert, cert.pem()).unwrap();
        std::fs::write(&ca_key, key.serialize_pem()).unwrap();

        MqttClientConfig {
            ca_cert,
            ca_key,
            client_cert_lifetime: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    #[tokio::test]
    async fn test_client_cert() {
        let dir = TempDir::new().unwrap();
        let conf = test_ca(&dir);
        let app_id = Uuid::new_v4();

        let issued = client_cert_for_application_id(&conf, &app_id).await.unwrap();
        assert_eq!(issued.ca_cert, std::fs::read_to_string(&conf.ca_cert).unwrap());
        assert!(issued.key.contains("PRIVATE KEY"));

        let days = (issued.expires_at - Utc::now()).num_days();
        assert!((29..=30).contains(&days), "{}", days);

        let (_, pem) = x509_parser::pem::parse_x509_pem(issued.cert.as_bytes()).unwrap();
        let cert = pem.parse_x509().unwrap();
        let cn = cert
            .subject()
            .iter_common_name()
            .next()
            .unwrap()
            .as_str()
            .unwrap();
        assert_eq!(cn, app_id.to_string());
        assert_eq!(
            cert.issuer().iter_common_name().next().unwrap().as_str().unwrap(),
            "netserver test CA"
        );
    }

    #[tokio::test]
    async fn test_missing_ca() {
        let conf = MqttClientConfig {
            ca_cert: "/nonexistent/ca.pem".into(),
            ..Default::default()
        };
        let err = client_cert_for_application_id(&conf, &Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Read CA certificate"));
    }
}
