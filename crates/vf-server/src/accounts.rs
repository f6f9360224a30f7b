//! Account rules: email and password validation, username derivation,
//! password hashing, and the activation / reset mail templates.

use uuid::Uuid;
use vf_core::{Error, Result, UserId};

use crate::mailer::OutgoingMail;

pub const ACTIVATION_SUBJECT: &str = "Videoflix - Activate your account";
pub const RESET_SUBJECT: &str = "Videoflix - Reset your password";

const MIN_PASSWORD_LEN: usize = 8;
const MAX_SIMILARITY: f64 = 0.7;

/// Frequently used passwords rejected at registration and reset.
const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password12", "password123", "passw0rd", "12345678",
    "123456789", "1234567890", "qwertyuiop", "qwerty123", "qwerty12", "iloveyou",
    "sunshine", "princess", "football", "baseball", "welcome1", "welcome123",
    "abc12345", "abcd1234", "letmein1", "trustno1", "superman", "starwars",
    "whatever", "dragon12", "master12", "monkey12", "shadow12", "michael1",
    "jennifer", "computer", "internet", "samsung1", "11111111", "00000000",
    "87654321", "qazwsxedc", "1q2w3e4r", "1qaz2wsx", "zaq12wsx", "asdfghjkl",
    "videoflix", "changeme", "administrator", "adminadmin", "letmein123",
    "hello123", "freedom1", "secret123",
];

/// Reject obviously malformed addresses. This is a shape check, not RFC 5322.
pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    let invalid = || Error::Validation("Enter a valid email address.".into());

    let (local, domain) = email.rsplit_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.is_empty()
        || local.contains('@')
        || email.chars().any(char::is_whitespace)
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains("..")
    {
        return Err(invalid());
    }
    Ok(())
}

/// Password strength rules. All violations are reported together.
pub fn validate_password(password: &str, email: Option<&str>) -> Result<()> {
    let mut problems = Vec::new();

    if let Some(email) = email {
        if is_too_similar(password, email) {
            problems.push("The password is too similar to the email.".to_string());
        }
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        problems.push(format!(
            "This password is too short. It must contain at least {MIN_PASSWORD_LEN} characters."
        ));
    }
    if COMMON_PASSWORDS.contains(&password.to_lowercase().trim()) {
        problems.push("This password is too common.".to_string());
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(problems.join(" ")))
    }
}

/// Compare against the whole email and each alphanumeric run of its local
/// part using a longest-common-subsequence ratio.
fn is_too_similar(password: &str, email: &str) -> bool {
    let password = password.to_lowercase();
    let email = email.to_lowercase();
    let local = email.split('@').next().unwrap_or_default();

    std::iter::once(email.as_str())
        .chain(std::iter::once(local))
        .chain(local.split(|c: char| !c.is_alphanumeric()))
        .filter(|part| part.len() >= 3)
        .any(|part| similarity(&password, part) >= MAX_SIMILARITY)
}

fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().take(64).collect();
    let b: Vec<char> = b.chars().take(64).collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    for ca in &a {
        let mut cur = vec![0usize; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        prev = cur;
    }
    2.0 * prev[b.len()] as f64 / (a.len() + b.len()) as f64
}

/// The email local part, used as the base for a unique username.
pub fn username_base(email: &str) -> String {
    email.trim().split('@').next().unwrap_or_default().to_string()
}

pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).map_err(|e| Error::Internal(format!("bcrypt error: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// `true` when `given` is the textual form of the stored token.
pub fn token_matches(stored: Option<Uuid>, given: &str) -> bool {
    stored.is_some_and(|t| t.to_string() == given.trim())
}

pub fn activation_link(base_url: &str, user_id: UserId, token: Uuid) -> String {
    format!(
        "{}/api/activate/{user_id}/{token}/",
        base_url.trim_end_matches('/')
    )
}

pub fn password_reset_link(frontend_url: &str, user_id: UserId, token: Uuid) -> String {
    format!(
        "{}/pages/auth/confirm_password.html?uid={user_id}&token={token}",
        frontend_url.trim_end_matches('/')
    )
}

pub fn login_redirect(frontend_url: &str) -> String {
    format!(
        "{}/pages/auth/login.html?message=activation_success",
        frontend_url.trim_end_matches('/')
    )
}

pub fn activation_email(from: &str, to: &str, activation_url: &str) -> OutgoingMail {
    let html = format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; color: #222;">
<h2>Welcome to Videoflix!</h2>
<p>Hello {to},</p>
<p>Thank you for registering. Please confirm your email address to activate your account:</p>
<p><a href="{activation_url}" style="background:#2e3edf;color:#fff;padding:10px 20px;border-radius:20px;text-decoration:none;">Activate account</a></p>
<p>If the button does not work, copy this link into your browser:</p>
<p>{activation_url}</p>
<p>The link is valid for 24 hours.</p>
<p>Your Videoflix team</p>
</body>
</html>"#
    );
    OutgoingMail::new(ACTIVATION_SUBJECT, from, to, html)
}

pub fn password_reset_email(from: &str, to: &str, reset_url: &str) -> OutgoingMail {
    let html = format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; color: #222;">
<h2>Reset your password</h2>
<p>Hello {to},</p>
<p>We received a request to reset the password of your Videoflix account.</p>
<p><a href="{reset_url}" style="background:#2e3edf;color:#fff;padding:10px 20px;border-radius:20px;text-decoration:none;">Reset password</a></p>
<p>If the button does not work, copy this link into your browser:</p>
<p>{reset_url}</p>
<p>The link is valid for 1 hour. If you did not request a reset, ignore this email.</p>
<p>Your Videoflix team</p>
</body>
</html>"#
    );
    OutgoingMail::new(RESET_SUBJECT, from, to, html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(validate_email("max@example.com").is_ok());
        assert!(validate_email("first.last+tag@sub.example.org").is_ok());
        for bad in ["", "max", "max@", "@example.com", "max@example", "a b@c.de", "a@b..de"] {
            assert!(validate_email(bad).is_err(), "{bad} should be invalid");
        }
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("Str0ng!Pass", Some("max@example.com")).is_ok());

        let short = validate_password("Ab1!", None).unwrap_err().to_string();
        assert!(short.contains("too short"));

        let numeric = validate_password("9876543210", None).unwrap_err().to_string();
        assert!(numeric.contains("entirely numeric"));

        let common = validate_password("Password123", None).unwrap_err().to_string();
        assert!(common.contains("too common"));
    }

    #[test]
    fn password_similar_to_email() {
        let err = validate_password("maxmustermann", Some("max.mustermann@example.com"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("too similar"));
        assert!(validate_password("Zebra-Kite-42", Some("max.mustermann@example.com")).is_ok());
    }

    #[test]
    fn similarity_ratio() {
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert!((similarity("abcd", "abxx") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn username_from_email() {
        assert_eq!(username_base("jane.doe@example.com"), "jane.doe");
    }

    #[test]
    fn links() {
        let token = Uuid::nil();
        assert_eq!(
            activation_link("http://127.0.0.1:8000/", UserId::from(4), token),
            format!("http://127.0.0.1:8000/api/activate/4/{token}/")
        );
        assert_eq!(
            password_reset_link("http://localhost:5500", UserId::from(4), token),
            format!("http://localhost:5500/pages/auth/confirm_password.html?uid=4&token={token}")
        );
        assert_eq!(
            login_redirect("http://localhost:5500"),
            "http://localhost:5500/pages/auth/login.html?message=activation_success"
        );
    }

    #[test]
    fn token_matching() {
        let t = Uuid::new_v4();
        assert!(token_matches(Some(t), &t.to_string()));
        assert!(!token_matches(Some(t), "other"));
        assert!(!token_matches(None, &t.to_string()));
    }

    #[test]
    fn hashing_roundtrip() {
        let hash = hash_password("s3cret-pass", 4).unwrap();
        assert!(verify_password("s3cret-pass", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("x", "not-a-hash"));
    }

    #[test]
    fn mail_templates() {
        let mail = activation_email("noreply@videoflix.com", "u@x.com", "http://h/api/activate/1/t/");
        assert_eq!(mail.subject, ACTIVATION_SUBJECT);
        assert!(mail.html.contains("href=\"http://h/api/activate/1/t/\""));
        assert!(mail.text.contains("http://h/api/activate/1/t/"));
        assert!(!mail.text.contains('<'));

        let reset = password_reset_email("noreply@videoflix.com", "u@x.com", "http://f/reset");
        assert_eq!(reset.subject, RESET_SUBJECT);
        assert_eq!(reset.from, "noreply@videoflix.com");
    }
}
