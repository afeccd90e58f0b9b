use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use portfolio_core::{
    load_settings, nav_links, status_message, ContactController, EmailJsLoader, MailClientLoader,
    MailConfig, MissingMailClientLoader, SectionTracker, Settings, StaticLayout, SubmitOutcome,
};
use shared::domain::ContactField;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Drive the portfolio page core from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay scroll offsets against a layout description.
    Track {
        #[arg(long)]
        layout: PathBuf,
        /// Scroll offsets to evaluate, in order.
        #[arg(long, num_args = 1.., required = true, allow_negative_numbers = true)]
        scroll: Vec<f64>,
        /// Print nav links as JSON instead of a text bar.
        #[arg(long)]
        json: bool,
    },
    /// Send one contact-form message through the configured mail service.
    Contact {
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        message: String,
        /// How long to wait for the mail client to load before submitting.
        #[arg(long, default_value_t = 3000)]
        wait_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings()?;

    match cli.command {
        Command::Track {
            layout,
            scroll,
            json,
        } => track(&settings, &layout, &scroll, json),
        Command::Contact {
            name,
            email,
            message,
            wait_ms,
        } => contact(&settings, name, email, message, wait_ms).await,
    }
}

fn track(settings: &Settings, layout_path: &Path, offsets: &[f64], json: bool) -> Result<()> {
    let raw = fs::read_to_string(layout_path)
        .with_context(|| format!("failed to read layout '{}'", layout_path.display()))?;
    let mut layout = StaticLayout::from_toml_str(&raw)?;

    let tracker = SectionTracker::with_default_sections().with_bias(settings.evaluation_bias());
    let mut active_rx = tracker.subscribe();

    for &offset in offsets {
        layout.scroll_to(offset);
        tracker.evaluate(&layout);

        let changed = active_rx.has_changed().unwrap_or(false);
        let active = active_rx.borrow_and_update().clone();
        let links = nav_links(&active);

        if json {
            println!(
                "{}",
                serde_json::json!({
                    "scroll": offset,
                    "active": active,
                    "changed": changed,
                    "nav": links,
                })
            );
        } else {
            let bar = links
                .iter()
                .map(|link| {
                    if link.is_active {
                        format!("[{}]", link.label)
                    } else {
                        link.label.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join("  ");
            let marker = if changed { " *" } else { "" };
            println!("scroll={offset:>8.1} active={active:<10}{marker}  {bar}");
        }
    }

    Ok(())
}

async fn contact(
    settings: &Settings,
    name: String,
    email: String,
    message: String,
    wait_ms: u64,
) -> Result<()> {
    let config = settings.mail_config();
    let loadable = matches!(config, MailConfig::Ready(_));
    // Without service identifiers every submit fails on configuration, so
    // there is nothing worth loading.
    let loader: Arc<dyn MailClientLoader> = match &config {
        MailConfig::Ready(_) => Arc::new(EmailJsLoader::new(settings.api_base.clone())),
        MailConfig::Missing { .. } => Arc::new(MissingMailClientLoader),
    };
    let controller = ContactController::mount(config, settings.contact_options(), loader);

    if loadable && wait_ms > 0 {
        let wait = Duration::from_millis(wait_ms);
        if tokio::time::timeout(wait, controller.wait_for_capability())
            .await
            .is_err()
        {
            warn!(wait_ms, "mail client not ready; submitting anyway");
        }
    }

    controller.set_field(ContactField::Name, name);
    controller.set_field(ContactField::Email, email);
    controller.set_field(ContactField::Message, message);

    let outcome = controller.submit().await;
    let state = controller.state();
    if let Some(text) = status_message(state.submission) {
        println!("{text}");
    }
    controller.unmount();

    match outcome {
        SubmitOutcome::Succeeded => {
            info!("contact message delivered");
            Ok(())
        }
        SubmitOutcome::Failed(err) => {
            bail!(
                "contact submission failed ({}): {err}",
                err.kind().as_str()
            )
        }
        SubmitOutcome::Ignored => bail!("contact submission was ignored"),
    }
}
