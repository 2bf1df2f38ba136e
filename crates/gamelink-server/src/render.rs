//! Browser pages for the approval flow
//!
//! Handlers build a [`PairingPage`] and hand it to a [`PageRenderer`], so
//! deployments can swap in their own templates.

use gamelink_auth::User;

/// View model for the browser side of pairing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingPage {
    /// Ask the signed-in user to confirm a pending request
    Confirm {
        request_id: String,
        expires_in: i64,
        user: User,
    },
    Approved {
        user: User,
    },
    Failed {
        message: String,
    },
    SignInRequired {
        login_url: String,
    },
}

/// Turns a page view model into an HTML body
pub trait PageRenderer: Send + Sync {
    fn render(&self, page: &PairingPage) -> String;
}

/// Minimal built-in HTML pages
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainRenderer;

impl PageRenderer for PlainRenderer {
    fn render(&self, page: &PairingPage) -> String {
        match page {
            PairingPage::Confirm {
                request_id,
                expires_in,
                user,
            } => layout(
                "Confirm game login",
                &format!(
                    r#"<p>Sign in to your game as <strong>{username}</strong>?</p>
<p>This request expires in {expires}.</p>
<form method="post" action="/game">
<input type="hidden" name="request_id" value="{request_id}">
<button type="submit">Confirm</button>
</form>"#,
                    username = escape_html(&user.username),
                    expires = describe_duration(*expires_in),
                    request_id = escape_html(request_id),
                ),
            ),
            PairingPage::Approved { user } => layout(
                "Game login approved",
                &format!(
                    "<p>Your game is now signed in as <strong>{}</strong>. You can close this page.</p>",
                    escape_html(&user.username)
                ),
            ),
            PairingPage::Failed { message } => layout(
                "Game login failed",
                &format!("<p>{}</p>", escape_html(message)),
            ),
            PairingPage::SignInRequired { login_url } => layout(
                "Sign in required",
                &format!(
                    r#"<p>Sign in to continue.</p>
<p><a href="{}">Sign in</a></p>"#,
                    escape_html(login_url)
                ),
            ),
        }
    }
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
</head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>
"#
    )
}

fn describe_duration(secs: i64) -> String {
    match secs {
        s if s >= 120 => format!("{} minutes", s / 60),
        1 => "1 second".to_string(),
        s => format!("{} seconds", s.max(0)),
    }
}

/// Escape text for use in HTML content and attribute values
pub fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_confirm_page_escapes_username() {
        let html = PlainRenderer.render(&PairingPage::Confirm {
            request_id: "r1".to_string(),
            expires_in: 300,
            user: User::new("u1", "<script>"),
        });
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains(r#"name="request_id" value="r1""#));
        assert!(html.contains("5 minutes"));
    }

    #[test]
    fn test_sign_in_page_links_login() {
        let html = PlainRenderer.render(&PairingPage::SignInRequired {
            login_url: "/login?redirect=%2Fgame".to_string(),
        });
        assert!(html.contains(r#"href="/login?redirect=%2Fgame""#));
    }

    #[test]
    fn test_describe_duration() {
        assert_eq!(describe_duration(300), "5 minutes");
        assert_eq!(describe_duration(90), "90 seconds");
        assert_eq!(describe_duration(1), "1 second");
        assert_eq!(describe_duration(-5), "0 seconds");
    }
}
