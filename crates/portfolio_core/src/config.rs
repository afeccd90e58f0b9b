use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;
use shared::domain::{PublicKey, ServiceId, TemplateId};

use crate::{contact::ContactOptions, section_tracker::EvaluationBias};

pub const SETTINGS_FILE: &str = "portfolio.toml";
pub const DEFAULT_API_BASE: &str = "https://api.emailjs.com";
pub const DEFAULT_RECIPIENT_NAME: &str = "Mihir";
pub const DEFAULT_SCROLL_BIAS_PX: f64 = 100.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub service_id: Option<String>,
    pub template_id: Option<String>,
    pub public_key: Option<String>,
    pub api_base: String,
    pub recipient_name: String,
    pub scroll_bias_px: f64,
    /// Fraction of the viewport height; takes precedence over
    /// `scroll_bias_px` when set.
    pub scroll_bias_fraction: Option<f64>,
    /// `None` or `0` disables the send timeout.
    pub send_timeout_ms: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_id: None,
            template_id: None,
            public_key: None,
            api_base: DEFAULT_API_BASE.into(),
            recipient_name: DEFAULT_RECIPIENT_NAME.into(),
            scroll_bias_px: DEFAULT_SCROLL_BIAS_PX,
            scroll_bias_fraction: None,
            send_timeout_ms: None,
        }
    }
}

impl Settings {
    pub fn mail_config(&self) -> MailConfig {
        MailConfig::from_parts(
            self.service_id.as_deref(),
            self.template_id.as_deref(),
            self.public_key.as_deref(),
        )
    }

    pub fn contact_options(&self) -> ContactOptions {
        ContactOptions {
            recipient_name: self.recipient_name.clone(),
            send_timeout: self.send_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn evaluation_bias(&self) -> EvaluationBias {
        match self.scroll_bias_fraction {
            Some(fraction) => EvaluationBias::ViewportFraction(fraction),
            None => EvaluationBias::Fixed(self.scroll_bias_px),
        }
    }
}

/// Defaults, then `portfolio.toml` in the working directory, then the
/// process environment.
pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_with(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_with(
    file: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = match fs::read_to_string(file) {
        Ok(raw) => toml::from_str::<Settings>(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", file.display()))?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Settings::default(),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", file.display()))
        }
    };

    // Later keys win.
    for key in [
        "EMAILJS_SERVICE_ID",
        "NEXT_PUBLIC_EMAILJS_SERVICE_ID",
        "APP__EMAILJS_SERVICE_ID",
    ] {
        if let Some(v) = env(key) {
            settings.service_id = Some(v);
        }
    }
    for key in [
        "EMAILJS_TEMPLATE_ID",
        "NEXT_PUBLIC_EMAILJS_TEMPLATE_ID",
        "APP__EMAILJS_TEMPLATE_ID",
    ] {
        if let Some(v) = env(key) {
            settings.template_id = Some(v);
        }
    }
    for key in [
        "EMAILJS_PUBLIC_KEY",
        "NEXT_PUBLIC_EMAILJS_PUBLIC_KEY",
        "APP__EMAILJS_PUBLIC_KEY",
    ] {
        if let Some(v) = env(key) {
            settings.public_key = Some(v);
        }
    }

    if let Some(v) = env("EMAILJS_API_BASE") {
        settings.api_base = v;
    }
    if let Some(v) = env("APP__EMAILJS_API_BASE") {
        settings.api_base = v;
    }

    if let Some(v) = env("APP__RECIPIENT_NAME") {
        settings.recipient_name = v;
    }

    if let Some(v) = env("APP__SCROLL_BIAS_PX") {
        match v.parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => settings.scroll_bias_px = parsed,
            _ => tracing::warn!(value = %v, "ignoring invalid APP__SCROLL_BIAS_PX"),
        }
    }

    if let Some(v) = env("APP__SCROLL_BIAS_FRACTION") {
        match v.parse::<f64>() {
            Ok(parsed) if parsed.is_finite() => settings.scroll_bias_fraction = Some(parsed),
            _ => tracing::warn!(value = %v, "ignoring invalid APP__SCROLL_BIAS_FRACTION"),
        }
    }

    if let Some(v) = env("APP__SEND_TIMEOUT_MS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.send_timeout_ms = Some(parsed),
            Err(_) => tracing::warn!(value = %v, "ignoring invalid APP__SEND_TIMEOUT_MS"),
        }
    }

    // Zero from either source means no timeout.
    settings.send_timeout_ms = settings.send_timeout_ms.filter(|ms| *ms > 0);
    settings.scroll_bias_fraction = settings
        .scroll_bias_fraction
        .filter(|fraction| fraction.is_finite());

    Ok(settings)
}

/// Identifiers for the mail-dispatch service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailServiceConfig {
    pub service_id: ServiceId,
    pub template_id: TemplateId,
    pub public_key: PublicKey,
}

/// Mail service configuration, validated once when the controller is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailConfig {
    Ready(MailServiceConfig),
    Missing { missing: Vec<&'static str> },
}

impl MailConfig {
    /// Blank or whitespace-only values count as absent.
    pub fn from_parts(
        service_id: Option<&str>,
        template_id: Option<&str>,
        public_key: Option<&str>,
    ) -> Self {
        let service_id = non_blank(service_id);
        let template_id = non_blank(template_id);
        let public_key = non_blank(public_key);

        match (service_id, template_id, public_key) {
            (Some(service_id), Some(template_id), Some(public_key)) => {
                MailConfig::Ready(MailServiceConfig {
                    service_id: ServiceId(service_id),
                    template_id: TemplateId(template_id),
                    public_key: PublicKey(public_key),
                })
            }
            (service_id, template_id, public_key) => {
                let mut missing = Vec::new();
                if service_id.is_none() {
                    missing.push("service_id");
                }
                if template_id.is_none() {
                    missing.push("template_id");
                }
                if public_key.is_none() {
                    missing.push("public_key");
                }
                MailConfig::Missing { missing }
            }
        }
    }

    pub fn service(&self) -> Option<&MailServiceConfig> {
        match self {
            MailConfig::Ready(service) => Some(service),
            MailConfig::Missing { .. } => None,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
