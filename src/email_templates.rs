// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Email bodies for the three capsule notifications.
//!
//! | Email | Recipient | Sent when |
//! |-------|-----------|-----------|
//! | creation | capsule recipient | capsule is created |
//! | unlock | capsule recipient | unlock job issues the PIN |
//! | sender notification | capsule sender | unlock email was delivered |
//!
//! User-supplied strings are HTML-escaped in the HTML part only.

use chrono::{DateTime, Utc};

use crate::mailer::OutgoingEmail;

const FOOTER_TEXT: &str = "This is an automated message from Memory Time Capsule.";

/// Fields shared by the recipient-facing emails.
#[derive(Debug, Clone)]
pub struct CapsuleEmailData<'a> {
    pub recipient_email: &'a str,
    pub recipient_name: Option<&'a str>,
    pub sender_name: &'a str,
    pub sender_email: &'a str,
    pub capsule_title: &'a str,
    pub unlock_at: i64,
    pub magic_link: &'a str,
}

impl CapsuleEmailData<'_> {
    fn greeting_name(&self) -> &str {
        self.recipient_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(self.recipient_email)
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Human-readable UTC date, e.g. `January 5, 2027`.
pub fn format_unlock_date(unlock_at: i64) -> String {
    DateTime::<Utc>::from_timestamp(unlock_at, 0)
        .map(|dt| dt.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|| unlock_at.to_string())
}

/// Percent-encode a WhatsApp share text into a `wa.me` link.
pub fn whatsapp_link(message: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
    // form encoding writes spaces as '+', wa.me expects %20
    format!("https://wa.me/?text={}", encoded.replace('+', "%20"))
}

fn layout(title: &str, heading: &str, gradient: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
  <div style="background: linear-gradient(135deg, {gradient}); padding: 30px; text-align: center; border-radius: 10px 10px 0 0;">
    <h1 style="color: white; margin: 0; font-size: 28px;">{heading}</h1>
  </div>
  <div style="background: #f9f9f9; padding: 30px; border-radius: 0 0 10px 10px;">
{body}
  </div>
</body>
</html>"#
    )
}

fn button(href: &str, label: &str, color: &str) -> String {
    format!(
        r#"    <div style="text-align: center; margin: 30px 0;">
      <a href="{href}" style="background: {color}; color: white; padding: 15px 30px; text-decoration: none; border-radius: 5px; font-size: 16px; display: inline-block;">{label}</a>
    </div>"#,
        href = escape_html(href),
    )
}

/// Sent to the recipient right after creation.
pub fn creation_email(data: &CapsuleEmailData<'_>) -> OutgoingEmail {
    let unlock_date = format_unlock_date(data.unlock_at);
    let sender = escape_html(data.sender_name);

    let body = format!(
        r#"    <p style="font-size: 16px;">Hi {name},</p>
    <p style="font-size: 16px;"><strong>{sender}</strong> has sent you a special time capsule that will unlock on:</p>
    <div style="background: white; padding: 20px; border-radius: 8px; border-left: 4px solid #667eea; margin: 20px 0;">
      <h2 style="margin: 0 0 10px 0; color: #667eea; font-size: 20px;">{title}</h2>
      <p style="margin: 0; font-size: 18px; color: #666;">🗓️ Unlocks: <strong>{unlock_date}</strong></p>
    </div>
    <p style="font-size: 16px;">This capsule is currently sealed and waiting for the special moment. You'll receive another email with access details when it unlocks.</p>
{button}
    <p style="font-size: 14px; color: #666; margin-top: 30px;">{FOOTER_TEXT} The capsule was created by {sender} ({sender_email}).</p>"#,
        name = escape_html(data.greeting_name()),
        title = escape_html(data.capsule_title),
        sender_email = escape_html(data.sender_email),
        button = button(data.magic_link, "View Countdown", "#667eea"),
    );

    let text = format!(
        "Time Capsule from {sender}\n\n\
         Hi {name},\n\n\
         {sender} has sent you a special time capsule: \"{title}\"\n\n\
         Unlocks: {unlock_date}\n\n\
         This capsule is currently sealed. You'll receive another email with access details when it unlocks.\n\n\
         View countdown: {link}\n\n\
         ---\n\
         {FOOTER_TEXT}\n\
         The capsule was created by {sender} ({sender_email}).",
        sender = data.sender_name,
        name = data.greeting_name(),
        title = data.capsule_title,
        link = data.magic_link,
        sender_email = data.sender_email,
    );

    OutgoingEmail {
        to: data.recipient_email.to_string(),
        subject: format!("🎁 Time capsule from {}", data.sender_name),
        html: layout(
            &format!("Time Capsule from {sender}"),
            "🎁 Time Capsule Sealed",
            "#667eea 0%, #764ba2 100%",
            &body,
        ),
        text,
    }
}

/// Sent to the recipient by the unlock job, carrying the PIN.
pub fn unlock_email(data: &CapsuleEmailData<'_>, pin: &str) -> OutgoingEmail {
    let sender = escape_html(data.sender_name);

    let body = format!(
        r#"    <p style="font-size: 16px;">Hi {name},</p>
    <p style="font-size: 16px;">The time capsule "<strong>{title}</strong>" from <strong>{sender}</strong> is now unlocked!</p>
    <div style="background: #fff3cd; padding: 20px; border-radius: 8px; margin: 20px 0;">
      <p style="margin: 0; font-weight: bold;">Your PIN:</p>
      <p style="font-size: 32px; text-align: center; letter-spacing: 8px; margin: 10px 0;">{pin}</p>
    </div>
{button}
    <p style="font-size: 14px; color: #666; margin-top: 30px;">{FOOTER_TEXT} The capsule was created by {sender}.</p>"#,
        name = escape_html(data.greeting_name()),
        title = escape_html(data.capsule_title),
        pin = escape_html(pin),
        button = button(data.magic_link, "Open Time Capsule", "#f5576c"),
    );

    let text = format!(
        "Your Time Capsule is Unlocked!\n\n\
         Hi {name},\n\n\
         The time capsule \"{title}\" from {sender} is now unlocked!\n\n\
         Your PIN: {pin}\n\n\
         Open your capsule: {link}\n\n\
         ---\n\
         {FOOTER_TEXT}",
        name = data.greeting_name(),
        title = data.capsule_title,
        sender = data.sender_name,
        link = data.magic_link,
    );

    OutgoingEmail {
        to: data.recipient_email.to_string(),
        subject: format!("🎉 Your time capsule from {} is unlocked!", data.sender_name),
        html: layout(
            "Your Time Capsule is Unlocked!",
            "🎉 Your Time Capsule is Unlocked!",
            "#f093fb 0%, #f5576c 100%",
            &body,
        ),
        text,
    }
}

/// Sent to the sender once the recipient's unlock email went out.
pub fn sender_notification(data: &CapsuleEmailData<'_>) -> OutgoingEmail {
    let share = whatsapp_link(&format!(
        "Hi! Your time capsule \"{}\" is now unlocked! View it here: {}",
        data.capsule_title, data.magic_link
    ));

    let body = format!(
        r#"    <p style="font-size: 16px;">Hi {sender},</p>
    <p style="font-size: 16px;">Your time capsule has been unlocked and delivered to <strong>{recipient}</strong>.</p>
    <h2 style="color: #667eea;">{title}</h2>
{button}"#,
        sender = escape_html(data.sender_name),
        recipient = escape_html(data.recipient_email),
        title = escape_html(data.capsule_title),
        button = button(&share, "📱 Send WhatsApp Reminder", "#25D366"),
    );

    let text = format!(
        "Your Time Capsule Has Unlocked\n\n\
         Your time capsule \"{title}\" has been unlocked and delivered to {recipient}.\n\n\
         Send WhatsApp reminder: {share}",
        title = data.capsule_title,
        recipient = data.recipient_email,
    );

    OutgoingEmail {
        to: data.sender_email.to_string(),
        subject: format!("✅ Your capsule to {} unlocked", data.recipient_email),
        html: layout(
            "Capsule Unlocked",
            "✅ Capsule Unlocked",
            "#667eea 0%, #764ba2 100%",
            &body,
        ),
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> CapsuleEmailData<'static> {
        CapsuleEmailData {
            recipient_email: "rita@example.com",
            recipient_name: Some("Rita"),
            sender_name: "Sam <admin>",
            sender_email: "sam@example.com",
            capsule_title: "Birthday & more",
            unlock_at: 1_800_000_000,
            magic_link: "https://capsule.example/open?t=abc",
        }
    }

    #[test]
    fn html_escapes_user_strings_but_text_does_not() {
        let email = creation_email(&data());
        assert!(email.html.contains("Sam &lt;admin&gt;"));
        assert!(email.html.contains("Birthday &amp; more"));
        assert!(!email.html.contains("<admin>"));
        assert!(email.text.contains("Sam <admin>"));
        assert_eq!(email.subject, "🎁 Time capsule from Sam <admin>");
        assert_eq!(email.to, "rita@example.com");
    }

    #[test]
    fn creation_email_links_to_countdown() {
        let email = creation_email(&data());
        assert!(email.text.contains("View countdown: https://capsule.example/open?t=abc"));
        assert!(email.text.contains(&format_unlock_date(1_800_000_000)));
        assert!(email.text.contains("Hi Rita,"));
    }

    #[test]
    fn greeting_falls_back_to_email() {
        let mut d = data();
        d.recipient_name = None;
        assert!(creation_email(&d).text.contains("Hi rita@example.com,"));
    }

    #[test]
    fn unlock_email_carries_pin() {
        let email = unlock_email(&data(), "0427");
        assert!(email.text.contains("Your PIN: 0427"));
        assert!(email.html.contains("0427"));
        assert_eq!(email.subject, "🎉 Your time capsule from Sam <admin> is unlocked!");
    }

    #[test]
    fn sender_notification_goes_to_sender_with_whatsapp_link() {
        let email = sender_notification(&data());
        assert_eq!(email.to, "sam@example.com");
        assert_eq!(email.subject, "✅ Your capsule to rita@example.com unlocked");
        assert!(email.text.contains("https://wa.me/?text="));
        assert!(!email.text.contains("unlocked! View"));
    }

    #[test]
    fn whatsapp_link_percent_encodes() {
        let link = whatsapp_link("a b&c");
        assert_eq!(link, "https://wa.me/?text=a%20b%26c");
    }

    #[test]
    fn unlock_date_is_readable() {
        assert_eq!(format_unlock_date(0), "January 1, 1970");
    }
}
