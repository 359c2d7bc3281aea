//! Command-line and environment configuration.

use core::fmt;
use core::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, value_parser};
use secrecy::SecretString;
use url::Url;

use crate::auth::login_server::{DEFAULT_LOGIN_TIMEOUT, MAX_LOGIN_TIMEOUT};
use crate::monarch::DEFAULT_API_URL;

/// Monarch Money MCP server.
#[derive(Clone, Parser)]
#[command(version, about)]
pub(crate) struct Config {
    /// Register tools that create, change or delete data.
    #[arg(
        long,
        env = "MONARCH_ENABLE_WRITE",
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub(crate) enable_write: bool,

    /// Monarch Money API base URL.
    #[arg(long, env = "MONARCH_API_URL", default_value = DEFAULT_API_URL)]
    pub(crate) api_url: Url,

    /// Seconds the browser sign-in page stays available (at most one day).
    #[arg(
        long,
        env = "MONARCH_LOGIN_TIMEOUT_SECS",
        default_value_t = DEFAULT_LOGIN_TIMEOUT.as_secs(),
        value_parser = value_parser!(u64).range(1..=MAX_LOGIN_TIMEOUT.as_secs())
    )]
    pub(crate) login_timeout_secs: u64,

    /// Account email for non-interactive sign-in.
    #[arg(long, env = "MONARCH_EMAIL", hide = true)]
    pub(crate) email: Option<String>,

    /// Account password for non-interactive sign-in.
    #[arg(long, env = "MONARCH_PASSWORD", hide = true, hide_env_values = true)]
    pub(crate) password: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("enable_write", &self.enable_write)
            .field("api_url", &self.api_url)
            .field("login_timeout_secs", &self.login_timeout_secs)
            .field("email", &self.email)
            .field(
                "password",
                &self.password.as_ref().map(|_password| "[REDACTED]"),
            )
            .finish()
    }
}

/// Email and password taken from the environment.
#[derive(Debug)]
pub(crate) struct EnvCredentials {
    /// Account email.
    pub(crate) email: String,
    /// Account password.
    pub(crate) password: SecretString,
}

impl Config {
    /// Lifetime of one browser sign-in attempt.
    pub(crate) const fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    /// Credentials for non-interactive sign-in, when both are non-empty.
    pub(crate) fn env_credentials(&self) -> Option<EnvCredentials> {
        let email = self.email.as_deref().map(str::trim).unwrap_or_default();
        let password = self.password.as_deref().unwrap_or_default();
        if email.is_empty() || password.is_empty() {
            return None;
        }
        Some(EnvCredentials {
            email: email.to_owned(),
            password: SecretString::from(password.to_owned()),
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    clippy::use_debug,
    reason = "test code uses expect for readability and inspects Debug output"
)]
mod tests {
    use core::time::Duration;

    use clap::Parser;
    use secrecy::ExposeSecret;

    use super::Config;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(core::iter::once("monarch-mcp").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    #[test]
    fn bare_write_flag_enables_writes() {
        assert!(parse(&["--enable-write"]).enable_write);
        assert!(parse(&["--enable-write=yes"]).enable_write);
        assert!(!parse(&["--enable-write=false"]).enable_write);
    }

    #[test]
    fn api_url_and_timeout_are_configurable() {
        let config = parse(&[
            "--api-url",
            "http://127.0.0.1:8080/",
            "--login-timeout-secs",
            "30",
        ]);
        assert_eq!(config.api_url.as_str(), "http://127.0.0.1:8080/");
        assert_eq!(config.login_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn login_timeout_defaults_to_ten_minutes() {
        assert_eq!(parse(&[]).login_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn invalid_api_url_is_rejected() {
        let result = Config::try_parse_from(["monarch-mcp", "--api-url", "not a url"]);
        assert!(result.is_err());
    }

    #[test]
    fn credentials_need_both_parts() {
        let only_email = parse(&["--email", "me@example.com", "--password", ""]);
        assert!(only_email.env_credentials().is_none());

        let both = parse(&["--email", " me@example.com ", "--password", "hunter2"]);
        let creds = both.env_credentials().expect("credentials should be present");
        assert_eq!(creds.email, "me@example.com");
        assert_eq!(creds.password.expose_secret(), "hunter2");
    }

    #[test]
    fn login_timeout_must_fit_in_a_day() {
        for value in ["0", "86401", "18446744073709551615"] {
            let _err = Config::try_parse_from(["monarch-mcp", "--login-timeout-secs", value])
                .expect_err("out-of-range timeout should be rejected");
        }
        assert_eq!(
            parse(&["--login-timeout-secs", "86400"]).login_timeout(),
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn debug_output_redacts_the_password() {
        let config = parse(&["--email", "me@example.com", "--password", "hunter2"]);
        let printed = format!("{config:?}");
        assert!(printed.contains("me@example.com"));
        assert!(printed.contains("[REDACTED]"));
        assert!(!printed.contains("hunter2"));
    }
}
