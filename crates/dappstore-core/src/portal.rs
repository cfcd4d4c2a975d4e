//! Publisher portal submission.
//!
//! One JSON `POST` to the review-intake form, carrying publisher contact
//! fields and release fields (both mint addresses, the compliance
//! attestations and a timestamped attestation text). [`PortalSubmitter::submit`]
//! never fails upward: every problem is logged and reported as `false`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{PipelineSettings, ReleaseConfig};

/// Form object type for publisher/contact fields.
pub const CONTACT_OBJECT: &str = "0-1";
/// Form object type for release/ticket fields.
pub const TICKET_OBJECT: &str = "0-5";

/// One form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalField {
    #[serde(rename = "objectTypeId")]
    pub object_type_id: String,
    pub name: String,
    pub value: Value,
}

impl PortalField {
    fn new(object_type_id: &str, name: &str, value: impl Into<Value>) -> Self {
        Self {
            object_type_id: object_type_id.to_string(),
            name: name.to_string(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalContext {
    pub page_uri: String,
    pub page_name: String,
}

/// The request body sent to the form endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalSubmission {
    /// Epoch milliseconds.
    pub submitted_at: i64,
    pub fields: Vec<PortalField>,
    pub context: PortalContext,
}

impl PortalSubmission {
    pub fn field(&self, name: &str) -> Option<&PortalField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Attestation text embedded in the release fields.
pub fn attestation_text(config: &ReleaseConfig, app: &str, release: &str, timestamp_ms: i64) -> String {
    format!(
        "dApp Store Submission\nApp: {}\nRelease: {}\nPublisher: {}\nTimestamp: {}",
        app, release, config.wallet_public_key, timestamp_ms
    )
}

/// Assemble the submission body. Pure; the caller supplies the clock.
pub fn build_submission(
    config: &ReleaseConfig,
    app: &str,
    release: &str,
    submitted_at_ms: i64,
    context: &PortalContext,
) -> PortalSubmission {
    let mut fields = vec![
        PortalField::new(CONTACT_OBJECT, "company", config.publisher.name.as_str()),
        PortalField::new(CONTACT_OBJECT, "email", config.publisher.email.as_str()),
        PortalField::new(CONTACT_OBJECT, "website", config.publisher.website.as_str()),
        PortalField::new(TICKET_OBJECT, "dapp_collection_account_address", app),
        PortalField::new(TICKET_OBJECT, "dapp_release_account_address", release),
        PortalField::new(TICKET_OBJECT, "requestor_is_authorized_to_submit_this_request", true),
        PortalField::new(TICKET_OBJECT, "complies_with_solana_dapp_store_policies", true),
        PortalField::new(
            TICKET_OBJECT,
            "attestation_payload",
            attestation_text(config, app, release, submitted_at_ms),
        ),
        PortalField::new(
            TICKET_OBJECT,
            "testing_instructions",
            config.testing_instructions.as_str(),
        ),
    ];
    if let Some(package) = config.google_play_package() {
        fields.push(PortalField::new(
            TICKET_OBJECT,
            "google_play_store_package_name",
            package,
        ));
    }

    PortalSubmission {
        submitted_at: submitted_at_ms,
        fields,
        context: context.clone(),
    }
}

/// Posts attestation records to the review portal.
pub struct PortalSubmitter {
    portal_url: String,
    context: PortalContext,
    simulate: bool,
    http_client: reqwest::Client,
}

impl PortalSubmitter {
    pub fn from_settings(settings: &PipelineSettings) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("dappstore-publish/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            portal_url: settings.portal_url.clone(),
            context: PortalContext {
                page_uri: settings.portal_page_uri.clone(),
                page_name: settings.portal_page_name.clone(),
            },
            simulate: settings.simulation.portal,
            http_client,
        })
    }

    /// Submit with the current time. Returns whether the portal accepted it.
    pub async fn submit(&self, config: &ReleaseConfig, app: &str, release: &str) -> bool {
        self.submit_at(config, app, release, chrono::Utc::now().timestamp_millis())
            .await
    }

    pub async fn submit_at(
        &self,
        config: &ReleaseConfig,
        app: &str,
        release: &str,
        submitted_at_ms: i64,
    ) -> bool {
        if self.simulate {
            info!(app = %app, release = %release, "SIMULATION: portal submission skipped");
            return true;
        }

        let body = build_submission(config, app, release, submitted_at_ms, &self.context);
        let response = match self.http_client.post(&self.portal_url).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %self.portal_url, error = %e, "portal submission error");
                return false;
            }
        };

        let status = response.status();
        if status.is_success() {
            info!(status = status.as_u16(), "submitted to publisher portal");
            true
        } else {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %text, "portal submission failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationFlags;
    use crate::fakes::fixtures::{release_config, WALLET};
    use std::path::Path;

    fn context() -> PortalContext {
        PortalContext {
            page_uri: "https://bubblewrapper.app".to_string(),
            page_name: "BubbleWrapper CLI Submission".to_string(),
        }
    }

    #[test]
    fn fields_split_by_object_type() {
        let config = release_config(Path::new("/r"));
        let body = build_submission(&config, "AppMint", "RelMint", 1_700_000_000_000, &context());

        let contact: Vec<_> = body
            .fields
            .iter()
            .filter(|f| f.object_type_id == CONTACT_OBJECT)
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(contact, vec!["company", "email", "website"]);

        assert_eq!(
            body.field("dapp_collection_account_address").unwrap().value,
            "AppMint"
        );
        assert_eq!(
            body.field("complies_with_solana_dapp_store_policies").unwrap().value,
            true
        );
        assert!(body.field("google_play_store_package_name").is_none());
    }

    #[test]
    fn attestation_names_both_tokens_and_publisher() {
        let config = release_config(Path::new("/r"));
        let text = attestation_text(&config, "AppMint", "RelMint", 42);
        assert_eq!(
            text,
            format!(
                "dApp Store Submission\nApp: AppMint\nRelease: RelMint\nPublisher: {}\nTimestamp: 42",
                WALLET
            )
        );
    }

    #[test]
    fn companion_package_is_included_when_present() {
        let mut config = release_config(Path::new("/r"));
        config.google_play_package = Some("me.monkemob.play".to_string());
        let body = build_submission(&config, "a", "r", 0, &context());
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["submittedAt"], 0);
        assert_eq!(json["context"]["pageName"], "BubbleWrapper CLI Submission");
        assert_eq!(
            body.field("google_play_store_package_name").unwrap().object_type_id,
            TICKET_OBJECT
        );
    }

    #[tokio::test]
    async fn simulation_skips_network() {
        let settings = PipelineSettings::default()
            .with_portal_url("http://127.0.0.1:1/never")
            .with_simulation(SimulationFlags::all());
        let submitter = PortalSubmitter::from_settings(&settings).unwrap();
        let config = release_config(Path::new("/r"));
        assert!(submitter.submit(&config, "a", "r").await);
    }

    #[tokio::test]
    async fn unreachable_portal_is_false_not_error() {
        let settings = PipelineSettings::default().with_portal_url("http://127.0.0.1:1/never");
        let submitter = PortalSubmitter::from_settings(&settings).unwrap();
        let config = release_config(Path::new("/r"));
        assert!(!submitter.submit(&config, "a", "r").await);
    }
}
