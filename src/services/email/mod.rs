pub mod console;
pub mod emailjs;

use async_trait::async_trait;

/// Parameters for the verification template.
#[derive(Debug, Clone)]
pub struct VerificationEmail {
    pub user_email: String,
    pub to_name: String,
    pub verification_code: String,
    pub booking_reference: String,
    pub expires_in: String,
}

/// Parameters for the confirmation template.
#[derive(Debug, Clone)]
pub struct ConfirmationEmail {
    pub user_email: String,
    pub to_name: String,
    pub room_name: String,
    pub building_name: String,
    pub booking_date: String,
    pub start_time: String,
    pub end_time: String,
    pub booking_reference: String,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_verification(&self, email: &VerificationEmail) -> anyhow::Result<()>;
    async fn send_confirmation(&self, email: &ConfirmationEmail) -> anyhow::Result<()>;
}
