//! Email service for the password reset and registration confirmation flows.

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::path::Path;

use crate::{config::Config, errors::Error};

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
    base_url: String,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = match &email_config.transport {
            crate::config::EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            crate::config::EmailTransportConfig::File { path } => {
                // File transport for development/testing
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        Ok(Self {
            transport,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            base_url: config.dashboard_url.clone(),
        })
    }

    /// Send the password reset link carrying the confirmation session token.
    pub async fn send_password_reset_email(&self, to_email: &str, to_name: Option<&str>, session_token: &str) -> Result<(), Error> {
        let reset_link = format!("{}/reset-password?session={}", self.base_url, urlencode(session_token));
        let body = confirmation_body(
            to_name,
            "Password Reset Request",
            "We received a request to reset your password. If you didn't make this request, you can safely ignore this email.",
            "Reset your password",
            &reset_link,
        );

        self.send_email(to_email, to_name, "Password Reset Request", &body).await
    }

    /// Send the registration link carrying the confirmation session token.
    pub async fn send_registration_email(&self, to_email: &str, session_token: &str) -> Result<(), Error> {
        let register_link = format!("{}/register?session={}", self.base_url, urlencode(session_token));
        let body = confirmation_body(
            None,
            "Confirm your registration",
            "Someone asked to create an account for this address. If that wasn't you, you can safely ignore this email.",
            "Complete your registration",
            &register_link,
        );

        self.send_email(to_email, None, "Confirm your registration", &body).await
    }

    async fn send_email(&self, to_email: &str, to_name: Option<&str>, subject: &str, body: &str) -> Result<(), Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = if let Some(name) = to_name {
            format!("{name} <{to_email}>")
        } else {
            to_email.to_string()
        }
        .parse::<Mailbox>()
        .map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
        }

        Ok(())
    }
}

/// Percent-encode the token for use in a query string.
///
/// Session tokens are mostly URL-safe already ('@' and ':' from the prefix
/// are the exception), so a minimal escape is enough.
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

fn confirmation_body(to_name: Option<&str>, title: &str, explanation: &str, link_text: &str, link: &str) -> String {
    let greeting = if let Some(name) = to_name {
        format!("Hello {name},")
    } else {
        "Hello,".to_string()
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
</head>
<body>
    <h2>{title}</h2>

    <p>{greeting}</p>

    <p>{explanation}</p>

    <p><a href="{link}">{link_text}</a></p>

    <p>Or copy and paste this link into your browser:</p>
    <p>{link}</p>

    <p>This link expires in one hour.</p>

    <p>This is an automated message, please do not reply to this email.</p>
</body>
</html>"#
    )
}
