use anyhow::Context;
use async_trait::async_trait;

use super::{ConfirmationEmail, EmailProvider, VerificationEmail};

const EMAILJS_ENDPOINT: &str = "https://api.emailjs.com/api/v1.0/email/send";

/// EmailJS REST relay: one POST per message with a template id and a flat
/// key/value parameter object.
pub struct EmailJsProvider {
    service_id: String,
    public_key: String,
    verify_template: String,
    confirm_template: String,
    client: reqwest::Client,
}

impl EmailJsProvider {
    pub fn new(
        service_id: String,
        public_key: String,
        verify_template: String,
        confirm_template: String,
    ) -> Self {
        Self {
            service_id,
            public_key,
            verify_template,
            confirm_template,
            client: reqwest::Client::new(),
        }
    }

    async fn dispatch(&self, template_id: &str, params: serde_json::Value) -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "service_id": self.service_id,
            "template_id": template_id,
            "user_id": self.public_key,
            "template_params": params,
        });

        self.client
            .post(EMAILJS_ENDPOINT)
            .json(&payload)
            .send()
            .await
            .context("failed to reach email relay")?
            .error_for_status()
            .context("email relay returned error")?;

        Ok(())
    }
}

#[async_trait]
impl EmailProvider for EmailJsProvider {
    async fn send_verification(&self, email: &VerificationEmail) -> anyhow::Result<()> {
        self.dispatch(
            &self.verify_template,
            serde_json::json!({
                "user_email": email.user_email,
                "to_name": email.to_name,
                "verification_code": email.verification_code,
                "booking_reference": email.booking_reference,
                "expires_in": email.expires_in,
            }),
        )
        .await
    }

    async fn send_confirmation(&self, email: &ConfirmationEmail) -> anyhow::Result<()> {
        self.dispatch(
            &self.confirm_template,
            serde_json::json!({
                "user_email": email.user_email,
                "to_name": email.to_name,
                "room_name": email.room_name,
                "building_name": email.building_name,
                "booking_date": email.booking_date,
                "start_time": email.start_time,
                "end_time": email.end_time,
                "booking_reference": email.booking_reference,
            }),
        )
        .await
    }
}
