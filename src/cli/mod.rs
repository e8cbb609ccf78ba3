pub mod driver;
pub mod interaction;
pub mod output;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use dialoguer::{theme::ColorfulTheme, Select};
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigManager, WizardConfig};
use crate::context::AppContext;
use crate::dispatch::http::{BackendSetupError, HttpBackend};
use crate::dispatch::memory::InMemoryBackend;
use crate::dispatch::{Dispatcher, RemoteBackend};
use crate::errors::{ConfigError, WizardError};
use crate::flows;
use crate::utils::clock::SystemClock;
use crate::wizard::flow::FlowKind;
use crate::wizard::session::Wizard;
use crate::wizard::value::FieldValue;

pub use driver::{drive, DriveOutcome};
pub use interaction::{DialoguerInteraction, FormInteraction, ScriptedInteraction};

const TOKEN_ENV: &str = "COOP_WIZARD_TOKEN";
const USER_ENV: &str = "COOP_WIZARD_USER_ID";
const WALLET_ENV: &str = "COOP_WIZARD_WALLET_BALANCE";
const NO_COLOR_ENV: &str = "NO_COLOR";

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] BackendSetupError),
    #[error(transparent)]
    Wizard(#[from] WizardError),
    #[error(transparent)]
    Dialoguer(#[from] dialoguer::Error),
}

/// Entry point of `coop_wizard_cli`.
pub async fn run_cli() -> Result<(), CliError> {
    let config = ConfigManager::new()?.load()?;
    crate::utils::init_tracing_with(&config.log_filter);
    if env::var_os(NO_COLOR_ENV).is_some() {
        output::set_plain(true);
    }

    let kind = choose_flow()?;
    let (backend, context) = backend_for(&config)?;
    let definition = flows::definition(kind, &config);
    let mut wizard = Wizard::new(
        definition,
        context,
        Dispatcher::new(backend),
        Arc::new(SystemClock),
        config,
    );

    if kind == FlowKind::LoanApplication && wizard.context().user_id.is_some() {
        show_loans(&mut wizard).await;
    }

    let mut ui = DialoguerInteraction::new();
    match drive(&mut wizard, &mut ui).await? {
        DriveOutcome::Completed(completion) => match completion.reference {
            Some(reference) => output::success(format!(
                "Your {} was submitted (reference {})",
                completion.flow, reference
            )),
            None => output::success(format!("Your {} was submitted", completion.flow)),
        },
        DriveOutcome::Cancelled => output::warning("Cancelled; nothing was submitted."),
    }
    Ok(())
}

async fn show_loans(wizard: &mut Wizard) {
    match wizard.fetch_loans().await {
        Ok(loans) if loans.is_empty() => {}
        Ok(loans) => {
            output::section("Your loans");
            for loan in loans {
                println!(
                    "  {} ({}): {} borrowed, {} outstanding",
                    loan.id,
                    loan.status,
                    FieldValue::Number(loan.amount).display(),
                    FieldValue::Number(loan.balance).display()
                );
            }
        }
        Err(err) => output::warning(err.user_message()),
    }
}

fn choose_flow() -> Result<FlowKind, CliError> {
    let kinds = [
        FlowKind::LoanApplication,
        FlowKind::Signup,
        FlowKind::InvestmentSubscription,
    ];
    let labels = ["Apply for a loan", "Sign up as a member", "Subscribe to an investment"];
    let index = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(kinds[index.min(kinds.len() - 1)])
}

fn backend_for(config: &WizardConfig) -> Result<(Arc<dyn RemoteBackend>, AppContext), CliError> {
    if config.is_offline() {
        info!("no API configured; using demo backend");
        output::info("Offline demo: access code COOP-2024, verification code 123456.");
        let context = AppContext::member("demo-member", 250_000.0);
        return Ok((Arc::new(InMemoryBackend::demo()), context));
    }

    let token = env::var(TOKEN_ENV).ok();
    let backend = HttpBackend::new(
        &config.api_base_url,
        Duration::from_secs(config.request_timeout_secs),
        token.clone(),
    )?;
    let mut context = AppContext {
        user_id: env::var(USER_ENV).ok(),
        wallet_balance: env::var(WALLET_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or_default(),
        ..AppContext::default()
    };
    if let Some(token) = token {
        context = context.with_token(token);
    }
    Ok((Arc::new(backend), context))
}
