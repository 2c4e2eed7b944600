use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub emailjs_service_id: String,
    pub emailjs_public_key: String,
    pub emailjs_verify_template: String,
    pub emailjs_confirm_template: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "roombook.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            emailjs_service_id: env::var("EMAILJS_SERVICE_ID").unwrap_or_default(),
            emailjs_public_key: env::var("EMAILJS_PUBLIC_KEY").unwrap_or_default(),
            emailjs_verify_template: env::var("EMAILJS_VERIFY_TEMPLATE").unwrap_or_default(),
            emailjs_confirm_template: env::var("EMAILJS_CONFIRM_TEMPLATE").unwrap_or_default(),
        }
    }

    /// All four relay settings present; otherwise the service runs in
    /// simulation mode and codes go to the log.
    pub fn email_configured(&self) -> bool {
        !(self.emailjs_service_id.is_empty()
            || self.emailjs_public_key.is_empty()
            || self.emailjs_verify_template.is_empty()
            || self.emailjs_confirm_template.is_empty())
    }
}
