mod theme;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    config::{load_settings, BootstrapSettings, DEFAULT_SETTINGS_FILE},
    global_loader, BootstrapController, BootstrapSnapshot, LocalIdentityService,
};
use shared::domain::PendingCredential;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::theme::ThemePreference;

const DEMO_USER_ID: &str = "demo-user";
const DEMO_EMAIL: &str = "demo@ga-life.dev";
const DEMO_PASSWORD: &str = "demo-password";
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Boot the app shell and print each settled snapshot as JSON.
    Run(RunArgs),
    /// Show or flip the saved theme.
    Theme {
        #[arg(value_enum, default_value_t = ThemeAction::Show)]
        action: ThemeAction,
        #[arg(long)]
        prefers_dark: bool,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    #[arg(long, requires = "password")]
    email: Option<String>,
    #[arg(long, requires = "email")]
    password: Option<String>,
    /// Complete a provider redirect login across a simulated reload.
    #[arg(long)]
    redirect: bool,
    #[arg(long)]
    sign_out: bool,
    #[arg(long, default_value_t = 25)]
    latency_ms: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ThemeAction {
    Show,
    Toggle,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();
    let settings = load_settings(&cli.config)?;

    match cli.command {
        Command::Run(args) => run(args, &settings).await,
        Command::Theme {
            action,
            prefers_dark,
        } => {
            let mut preference = ThemePreference::load(&settings.preferences_path, prefers_dark);
            let theme = match action {
                ThemeAction::Show => preference.theme(),
                ThemeAction::Toggle => preference.toggle()?,
            };
            println!("{}", theme.as_str());
            Ok(())
        }
    }
}

async fn run(args: RunArgs, settings: &BootstrapSettings) -> Result<()> {
    let identity = Arc::new(
        LocalIdentityService::new()
            .with_account(DEMO_USER_ID, DEMO_EMAIL, DEMO_PASSWORD)
            .with_latency(Duration::from_millis(args.latency_ms)),
    );
    let loader = global_loader();

    let mut controller = BootstrapController::activate(identity.clone(), loader.clone(), settings);
    let mut snapshots = controller.subscribe();
    let snapshot = wait_until(&mut snapshots, "initial load", |s| {
        s.is_session_ready && s.module_output.is_settled() && s.redirect.is_settled()
    })
    .await?;
    print_snapshot("loaded", &snapshot)?;

    if let (Some(email), Some(password)) = (args.email, args.password) {
        controller
            .sign_in_with_password(PendingCredential::new(email, password))
            .await;
        let snapshot = wait_until(&mut snapshots, "password sign-in", |s| {
            s.user().is_some() || s.last_error.is_some()
        })
        .await?;
        print_snapshot("password_sign_in", &snapshot)?;
    }

    if args.redirect {
        controller.sign_in_with_google_redirect().await;
        print_snapshot("redirect_requested", &controller.snapshot())?;

        // The provider round trip reloads the page, so the shell mounts again.
        info!("desktop: simulating reload after provider redirect");
        controller.deactivate();
        controller = BootstrapController::activate(identity.clone(), loader.clone(), settings);
        snapshots = controller.subscribe();
        let snapshot = wait_until(&mut snapshots, "redirect resolution", |s| {
            s.is_session_ready && s.redirect.is_settled() && s.module_output.is_settled()
        })
        .await?;
        print_snapshot("redirect_resolved", &snapshot)?;
    }

    if args.sign_out {
        controller.sign_out().await;
        let snapshot = wait_until(&mut snapshots, "sign-out", |s| {
            s.user().is_none() || s.last_error.is_some()
        })
        .await?;
        print_snapshot("signed_out", &snapshot)?;
    }

    controller.deactivate();
    Ok(())
}

async fn wait_until(
    snapshots: &mut watch::Receiver<BootstrapSnapshot>,
    stage: &str,
    predicate: impl FnMut(&BootstrapSnapshot) -> bool,
) -> Result<BootstrapSnapshot> {
    let snapshot = tokio::time::timeout(SETTLE_TIMEOUT, snapshots.wait_for(predicate))
        .await
        .with_context(|| format!("timed out waiting for {stage}"))?
        .with_context(|| format!("snapshot channel closed during {stage}"))?
        .clone();
    Ok(snapshot)
}

fn print_snapshot(stage: &str, snapshot: &BootstrapSnapshot) -> Result<()> {
    let line = serde_json::json!({ "stage": stage, "snapshot": snapshot });
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}
