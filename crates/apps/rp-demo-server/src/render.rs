//! Page rendering, kept behind [`Renderer`] so handlers never build markup.

use rp_oidc::IdentityClaims;

/// Pages the demo front-end can show.
#[derive(Debug)]
pub enum Page<'a> {
    Landing { redirect_uri: &'a str },
    Authenticated { claims: &'a IdentityClaims },
    Failed { message: &'a str },
}

pub trait Renderer: Send + Sync {
    fn render(&self, page: &Page<'_>) -> Vec<u8>;
}

/// Renders minimal standalone HTML pages.
#[derive(Debug, Clone)]
pub struct HtmlRenderer {
    app_name: String,
}

impl HtmlRenderer {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    fn document(&self, title: &str, body: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{title} - {app}</title>
  <link rel="stylesheet" href="/static/style.css">
</head>
<body>
  <h1>{app}</h1>
{body}
</body>
</html>
"#,
            title = escape_html(title),
            app = escape_html(&self.app_name),
            body = body
        )
    }

    fn landing(&self, redirect_uri: &str) -> String {
        let body = format!(
            r#"  <p>Sign in with the identity provider.</p>
  <p><a class="button" href="/login">Log in</a></p>
  <p><a href="/autologin">Log in automatically with the test identity</a></p>
  <p class="meta">Callback address: <code>{}</code></p>"#,
            escape_html(redirect_uri)
        );
        self.document("Welcome", &body)
    }

    fn authenticated(&self, claims: &IdentityClaims) -> String {
        let mut rows = vec![
            ("Subject", claims.subject.clone()),
            ("Issuer", claims.issuer.clone()),
            ("Issued at", claims.issued_at.to_rfc3339()),
            ("Expires at", claims.expires_at.to_rfc3339()),
        ];

        if let Some(profile) = claims.profile_attributes() {
            for (label, value) in [
                ("Given name", profile.given_name),
                ("Family name", profile.family_name),
                ("Date of birth", profile.date_of_birth),
            ] {
                if let Some(value) = value {
                    rows.push((label, value));
                }
            }
        }

        let methods = claims.authentication_methods();
        if !methods.is_empty() {
            rows.push(("Authentication methods", methods.join(", ")));
        }
        if let Some(acr) = claims.assurance_level() {
            rows.push(("Assurance level", acr.to_string()));
        }

        let table: String = rows
            .iter()
            .map(|(label, value)| {
                format!(
                    "    <tr><th>{}</th><td>{}</td></tr>\n",
                    label,
                    escape_html(value)
                )
            })
            .collect();

        let personal_data =
            serde_json::to_string_pretty(&claims.personal_data).unwrap_or_default();

        let body = format!(
            r#"  <p>Authenticated.</p>
  <table>
{table}  </table>
  <h2>Identity token claims</h2>
  <pre>{data}</pre>
  <p><a href="/">Back</a></p>"#,
            table = table,
            data = escape_html(&personal_data)
        );
        self.document("Authenticated", &body)
    }

    fn failed(&self, message: &str) -> String {
        let body = format!(
            r#"  <p class="error">{}</p>
  <p><a href="/">Back</a></p>"#,
            escape_html(message)
        );
        self.document("Authentication failed", &body)
    }
}

impl Renderer for HtmlRenderer {
    fn render(&self, page: &Page<'_>) -> Vec<u8> {
        let html = match page {
            Page::Landing { redirect_uri } => self.landing(redirect_uri),
            Page::Authenticated { claims } => self.authenticated(claims),
            Page::Failed { message } => self.failed(message),
        };
        html.into_bytes()
    }
}

pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn claims() -> IdentityClaims {
        let personal_data = json!({
            "amr": ["mID"],
            "acr": "high",
            "profile_attributes": {
                "given_name": "MARY ÄNN",
                "family_name": "<script>alert(1)</script>",
                "date_of_birth": "2000-01-01"
            }
        });
        IdentityClaims {
            subject: "EE60001019906".to_string(),
            issuer: "https://idp.example".to_string(),
            audience: vec!["demo-client".to_string()],
            issued_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            expires_at: Utc.timestamp_opt(1_700_000_600, 0).unwrap(),
            nonce: "n".to_string(),
            personal_data: personal_data.as_object().unwrap().clone(),
        }
    }

    fn render(page: Page<'_>) -> String {
        String::from_utf8(HtmlRenderer::new("Demo").render(&page)).unwrap()
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">O'Brien & co</a>"#),
            "&lt;a href=&quot;x&quot;&gt;O&#x27;Brien &amp; co&lt;/a&gt;"
        );
    }

    #[test]
    fn test_landing_links() {
        let html = render(Page::Landing {
            redirect_uri: "https://localhost:8081/return",
        });
        assert!(html.contains(r#"href="/login""#));
        assert!(html.contains(r#"href="/autologin""#));
        assert!(html.contains("https://localhost:8081/return"));
    }

    #[test]
    fn test_authenticated_page_escapes_claims() {
        let claims = claims();
        let html = render(Page::Authenticated { claims: &claims });

        assert!(html.contains("EE60001019906"));
        assert!(html.contains("MARY ÄNN"));
        assert!(html.contains("mID"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_failure_page() {
        let html = render(Page::Failed {
            message: rp_oidc::GENERIC_FAILURE_MESSAGE,
        });
        assert!(html.contains(rp_oidc::GENERIC_FAILURE_MESSAGE));
    }
}
