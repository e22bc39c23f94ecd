//! Rendering of the files the agent manages: the Omnibus `gitlab.rb` and the
//! `pgloader` instructions used for the MySQL to PostgreSQL migration.

use crate::config::EmailSettings;
use crate::core::database::{CacheEndpoint, DatabaseCredentials, DatabaseEndpoint};
use crate::core::resolver::ResolvedConfiguration;
use crate::errors::{Error, Result};
use url::Url;

/// SMTP relay block of the application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpBlock {
    pub server: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub domain: String,
    pub authentication: String,
    pub tls: bool,
}

/// Every value that goes into `gitlab.rb`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationSettings {
    pub external_url: String,
    pub db_adapter: String,
    pub db: DatabaseCredentials,
    pub cache: Option<CacheEndpoint>,
    pub http_port: u16,
    pub ssh_host: String,
    pub ssh_port: u16,
    pub smtp: Option<SmtpBlock>,
    pub email: EmailSettings,
}

impl ApplicationSettings {
    /// Settings for `endpoint`; `None` when no backend is configured.
    #[must_use]
    pub fn build(
        resolved: &ResolvedConfiguration,
        endpoint: &DatabaseEndpoint,
        cache: Option<CacheEndpoint>,
    ) -> Option<Self> {
        let db = endpoint.credentials()?.clone();
        let db_adapter = endpoint.adapter()?.to_string();

        let smtp = match (&resolved.smtp.server, resolved.smtp.port) {
            (Some(server), Some(port)) if resolved.smtp_enabled => Some(SmtpBlock {
                server: server.clone(),
                port,
                user: resolved.smtp.user.clone(),
                password: resolved.smtp.password.clone(),
                domain: resolved.smtp_domain.clone(),
                authentication: resolved.smtp.authentication.clone(),
                tls: resolved.smtp.tls,
            }),
            _ => None,
        };

        Some(Self {
            external_url: resolved.external_url.clone(),
            db_adapter,
            db,
            cache,
            http_port: resolved.http_port,
            ssh_host: resolved.ssh_host.clone(),
            ssh_port: resolved.ssh_port,
            smtp,
            email: resolved.email.clone(),
        })
    }
}

/// Single-quoted Ruby string literal
fn ruby_str(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Relation ports arrive as strings; numeric ones are emitted bare.
fn ruby_port(value: &str) -> String {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        value.to_string()
    } else {
        ruby_str(value)
    }
}

struct RubyConfig {
    lines: Vec<String>,
}

impl RubyConfig {
    fn section(&mut self, title: &str) {
        self.lines.push(String::new());
        self.lines.push(format!("## {title}"));
    }

    fn raw(&mut self, key: &str, value: impl Into<String>) {
        self.lines.push(format!("{key} = {}", value.into()));
    }

    fn rails(&mut self, key: &str, value: impl Into<String>) {
        self.raw(&format!("gitlab_rails['{key}']"), value);
    }

    fn rails_str(&mut self, key: &str, value: &str) {
        self.rails(key, ruby_str(value));
    }
}

/// Renders `gitlab.rb`.
#[must_use]
pub fn render_gitlab_rb(settings: &ApplicationSettings) -> String {
    let mut rb = RubyConfig {
        lines: vec![
            "# Managed by omnibus-agent. Local changes will be overwritten.".to_string(),
            format!("external_url {}", ruby_str(&settings.external_url)),
        ],
    };

    rb.section("Database");
    rb.raw("postgresql['enable']", "false");
    rb.rails_str("db_adapter", &settings.db_adapter);
    let encoding = if settings.db_adapter == "postgresql" {
        "unicode"
    } else {
        "utf8"
    };
    rb.rails_str("db_encoding", encoding);
    rb.rails_str("db_host", &settings.db.host);
    rb.rails("db_port", ruby_port(&settings.db.port));
    rb.rails_str("db_database", &settings.db.database);
    rb.rails_str("db_username", &settings.db.user);
    rb.rails_str("db_password", &settings.db.password);

    if let Some(cache) = &settings.cache {
        rb.section("Redis");
        rb.raw("redis['enable']", "false");
        rb.rails_str("redis_host", &cache.host);
        rb.rails("redis_port", ruby_port(&cache.port));
        if let Some(password) = &cache.password {
            rb.rails_str("redis_password", password);
        }
    }

    rb.section("Web server");
    rb.raw("nginx['listen_port']", settings.http_port.to_string());

    rb.section("SSH");
    rb.rails_str("gitlab_ssh_host", &settings.ssh_host);
    rb.rails("gitlab_shell_ssh_port", settings.ssh_port.to_string());

    if let Some(smtp) = &settings.smtp {
        rb.section("SMTP");
        rb.rails("smtp_enable", "true");
        rb.rails_str("smtp_address", &smtp.server);
        rb.rails("smtp_port", smtp.port.to_string());
        if let Some(user) = &smtp.user {
            rb.rails_str("smtp_user_name", user);
        }
        if let Some(password) = &smtp.password {
            rb.rails_str("smtp_password", password);
        }
        rb.rails_str("smtp_domain", &smtp.domain);
        rb.rails(
            "smtp_authentication",
            format!(":{}", smtp.authentication.trim_start_matches(':')),
        );
        rb.rails("smtp_enable_starttls_auto", smtp.tls.to_string());
    }

    let email = [
        ("gitlab_email_from", &settings.email.from),
        ("gitlab_email_display_name", &settings.email.display_name),
        ("gitlab_email_reply_to", &settings.email.reply_to),
    ];
    if email.iter().any(|(_, v)| v.is_some()) {
        rb.section("Email");
        for (key, value) in email {
            if let Some(value) = value {
                rb.rails_str(key, value);
            }
        }
    }

    let mut out = rb.lines.join("\n");
    out.push('\n');
    out
}

fn connection_url(scheme: &str, credentials: &DatabaseCredentials) -> Result<String> {
    let mut url = Url::parse(&format!(
        "{scheme}://{}:{}/{}",
        credentials.host, credentials.port, credentials.database
    ))
    .map_err(|e| Error::config(format!("invalid {scheme} endpoint: {e}")))?;
    url.set_username(&credentials.user)
        .and_then(|()| url.set_password(Some(&credentials.password)))
        .map_err(|()| Error::config(format!("cannot embed credentials in {scheme} URL")))?;
    Ok(url.to_string())
}

/// Renders the `pgloader` load file moving `mysql` data into `pgsql`.
pub fn render_commands_load(
    mysql: &DatabaseCredentials,
    pgsql: &DatabaseCredentials,
) -> Result<String> {
    let from = connection_url("mysql", mysql)?;
    let into = connection_url("postgresql", pgsql)?;
    Ok(format!(
        "LOAD DATABASE
     FROM {from}
     INTO {into}

WITH include no drop, truncate, disable triggers, create no tables,
     create no indexes, preserve index names, no foreign keys,
     data only

ALTER SCHEMA '{schema}' RENAME TO 'public'
;
",
        schema = mysql.database.replace('\'', "''"),
    ))
}
