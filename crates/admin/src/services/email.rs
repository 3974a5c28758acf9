//! Email delivery for customer communications.
//!
//! Uses SMTP via lettre with Askama templates. Every message is sent as
//! multipart/alternative: the rendered body as plain text, plus an HTML
//! version wrapped in the seller's branding.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;

/// HTML wrapper for a communication.
#[derive(Template)]
#[template(path = "email/communication.html")]
struct CommunicationEmailHtml<'a> {
    subject: &'a str,
    store_name: &'a str,
    paragraphs: Vec<&'a str>,
}

/// Plain text wrapper for a communication.
#[derive(Template)]
#[template(path = "email/communication.txt")]
struct CommunicationEmailText<'a> {
    store_name: &'a str,
    body: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A message ready to go out.
#[derive(Debug, Clone, Copy)]
pub struct OutgoingEmail<'a> {
    pub to: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
    /// Shown as the sender's display name and in the HTML header.
    pub store_name: &'a str,
}

/// Email service for customer communications.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl std::fmt::Debug for EmailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailService")
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send one communication.
    ///
    /// # Errors
    ///
    /// Returns error if an address is invalid, a template fails to render,
    /// or the SMTP server rejects the message.
    pub async fn send(&self, email: &OutgoingEmail<'_>) -> Result<(), EmailError> {
        let html = CommunicationEmailHtml {
            subject: email.subject,
            store_name: email.store_name,
            paragraphs: paragraphs(email.body),
        }
        .render()?;
        let text = CommunicationEmailText {
            store_name: email.store_name,
            body: email.body,
        }
        .render()?;

        self.send_multipart_email(email, &text, &html).await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        email: &OutgoingEmail<'_>,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let from = sender(&self.from_address, email.store_name)?;
        let message = Message::builder()
            .from(from)
            .to(email
                .to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(email.to.to_string()))?)
            .subject(email.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(message).await?;

        tracing::info!(to = %email.to, subject = %email.subject, "Email sent successfully");
        Ok(())
    }
}

/// The From mailbox: the configured address under the store's name.
fn sender(from_address: &str, store_name: &str) -> Result<Mailbox, EmailError> {
    let address = from_address
        .parse()
        .map_err(|_| EmailError::InvalidAddress(from_address.to_string()))?;
    let name = store_name.trim();
    Ok(Mailbox::new(
        (!name.is_empty()).then(|| name.to_string()),
        address,
    ))
}

/// Split a plain-text body on blank lines.
fn paragraphs(body: &str) -> Vec<&str> {
    body.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_split_on_blank_lines() {
        assert_eq!(
            paragraphs("Hi Ada,\n\nThanks for your order.\n\n\n\nPixel Press"),
            vec!["Hi Ada,", "Thanks for your order.", "Pixel Press"]
        );
        assert!(paragraphs("  \n\n ").is_empty());
    }

    #[test]
    fn test_sender_uses_store_name() {
        let mailbox = sender("orders@example.com", "Pixel Press").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("Pixel Press"));
        assert_eq!(mailbox.email.to_string(), "orders@example.com");

        let bare = sender("orders@example.com", "  ").unwrap();
        assert!(bare.name.is_none());

        assert!(matches!(
            sender("not an address", "Pixel Press"),
            Err(EmailError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_html_escapes_body() {
        let html = CommunicationEmailHtml {
            subject: "Hello",
            store_name: "Pixel Press",
            paragraphs: vec!["<script>alert(1)</script>"],
        }
        .render()
        .unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
