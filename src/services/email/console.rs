use async_trait::async_trait;

use super::{ConfirmationEmail, EmailProvider, VerificationEmail};

/// Simulation mode: no relay credentials configured, so codes go to the log
/// instead of an inbox. Kept as a supported configuration branch for local
/// development and tests.
pub struct ConsoleMailer;

#[async_trait]
impl EmailProvider for ConsoleMailer {
    async fn send_verification(&self, email: &VerificationEmail) -> anyhow::Result<()> {
        tracing::info!(
            to = %email.user_email,
            code = %email.verification_code,
            reference = %email.booking_reference,
            "simulated verification email"
        );
        Ok(())
    }

    async fn send_confirmation(&self, email: &ConfirmationEmail) -> anyhow::Result<()> {
        tracing::info!(
            to = %email.user_email,
            reference = %email.booking_reference,
            room = %email.room_name,
            "simulated confirmation email"
        );
        Ok(())
    }
}
