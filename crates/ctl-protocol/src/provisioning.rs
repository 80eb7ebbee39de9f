use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Body of `certificates/create/json/accepted`.
///
/// Only the key material is required; the id and ownership token feed the
/// provisioning request and are empty when the broker leaves them out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCertificateResponse {
    #[serde(default)]
    pub certificate_id: String,
    pub certificate_pem: String,
    pub private_key: String,
    #[serde(default)]
    pub certificate_ownership_token: String,
}

impl CreateCertificateResponse {
    /// Whether a provisioning request can be built from this response.
    pub fn can_register(&self) -> bool {
        !self.certificate_ownership_token.is_empty()
    }
}

/// Body of `provisioning-templates/{template}/provision/json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterThingRequest {
    pub certificate_ownership_token: String,
    pub parameters: BTreeMap<String, String>,
}

impl RegisterThingRequest {
    /// Template parameter carrying the thing name.
    pub const THING_NAME: &'static str = "ThingName";
    /// Template parameter carrying the issued certificate id.
    pub const CERTIFICATE_ID: &'static str = "Ctl::Certificate::Id";

    pub fn new(thing_name: &str, certificate: &CreateCertificateResponse) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert(Self::THING_NAME.to_string(), thing_name.to_string());
        parameters.insert(
            Self::CERTIFICATE_ID.to_string(),
            certificate.certificate_id.clone(),
        );
        Self {
            certificate_ownership_token: certificate.certificate_ownership_token.clone(),
            parameters,
        }
    }
}

/// Credentials persisted between certificate creation and provisioning
/// acceptance: `{"certificate": PEM, "privateKey": PEM}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedCredentials {
    pub certificate: String,
    pub private_key: String,
}

impl From<&CreateCertificateResponse> for ProvisionedCredentials {
    fn from(response: &CreateCertificateResponse) -> Self {
        Self {
            certificate: response.certificate_pem.clone(),
            private_key: response.private_key.clone(),
        }
    }
}
