//! Template rendering for verification-token emails. Templates are stored
//! per-type in the `templates` table (see `db::TemplateStore`) with a
//! built-in fallback when no customization exists, and support the
//! placeholder variables `SiteURL`, `ConfirmationURL`, `Email`, `Token`,
//! `ExpiresIn`.

use crate::db::{Database, Template};
use std::collections::HashMap;

pub struct RenderedTemplate {
    pub subject: String,
    pub body_html: String,
    pub body_text: Option<String>,
}

fn default_template(template_type: &str) -> (&'static str, &'static str) {
    match template_type {
        "recovery" => (
            "Reset your password",
            "<p>Follow this link to reset your password:</p><p><a href=\"{{ .ConfirmationURL }}\">Reset password</a></p>",
        ),
        "magiclink" => (
            "Your login link",
            "<p>Follow this link to log in:</p><p><a href=\"{{ .ConfirmationURL }}\">Log in</a></p>",
        ),
        "invite" => (
            "You have been invited",
            "<p>You have been invited to create an account.</p><p><a href=\"{{ .ConfirmationURL }}\">Accept the invite</a></p>",
        ),
        "email_change" => (
            "Confirm your new email",
            "<p>Follow this link to confirm your new email address:</p><p><a href=\"{{ .ConfirmationURL }}\">Confirm new email</a></p>",
        ),
        _ => (
            "Confirm your signup",
            "<p>Follow this link to confirm your account:</p><p><a href=\"{{ .ConfirmationURL }}\">Confirm your email</a></p>",
        ),
    }
}

fn substitute(input: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = input.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{ .{key} }}}}"), value);
    }
    out
}

pub async fn render_template(
    db: &Database,
    template_type: &str,
    vars: &HashMap<&str, String>,
) -> Result<RenderedTemplate, crate::error::Error> {
    let stored: Option<Template> = db.templates().get(template_type).await?;

    let (subject, body_html, body_text) = match stored {
        Some(t) => (t.subject, t.body_html, t.body_text),
        None => {
            let (subject, html) = default_template(template_type);
            (subject.to_string(), html.to_string(), None)
        }
    };

    Ok(RenderedTemplate {
        subject: substitute(&subject, vars),
        body_html: substitute(&body_html, vars),
        body_text: body_text.map(|t| substitute(&t, vars)),
    })
}
