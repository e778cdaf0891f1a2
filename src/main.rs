// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

use hospital_vc::agent::setup::{create_issuer, create_verifier, setup_did, TerminalOperator};
use hospital_vc::did::{sov_did_from_indy, DidState};
use hospital_vc::fhir::smart::SmartLauncher;
use hospital_vc::fhir::FhirSession;
use hospital_vc::gateway::api::SMART_ROUTER_PATH;
use hospital_vc::gateway::{run_gateway, AppState};
use hospital_vc::prescription::PrescriptionCredentialMapper;
use hospital_vc::rxnorm::RxNormClient;
use hospital_vc::util::backend_base_url;
use hospital_vc::{Agent, Config};

#[derive(Parser)]
#[command(name = "hospital-vc", version)]
#[command(about = "Hospital prescription credentials over OpenID4VCI and OpenID4VP")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Logging level: trace, debug, info, warn or error
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the backend (default)
    Serve {
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to bind and advertise
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Create a DID endorsed by the backend DID and print it with its seed
    Did,
}

/// Agent with the backend DID in place.
struct Backend {
    agent: Arc<Agent>,
    fhir: FhirSession,
    /// `did:indy` of the backend.
    backend_did: String,
}

async fn start(config: &Config) -> Result<Backend> {
    let fhir = FhirSession::new();
    let mapper = Arc::new(PrescriptionCredentialMapper::new(
        Arc::new(fhir.clone()),
        Arc::new(RxNormClient::new(&config.rxnorm)),
    ));
    let agent = Agent::initialize(config, mapper).await?;
    let backend_did = setup_did(&agent, &TerminalOperator).await?;
    tracing::info!(did = %backend_did, "Backend DID ready");
    Ok(Backend {
        agent: Arc::new(agent),
        fhir,
        backend_did,
    })
}

async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    let host = host.unwrap_or_else(|| config.server.bind_host.clone());

    let backend = start(&config).await?;
    let issuer_did = sov_did_from_indy(&backend.backend_did)?;
    if let Err(e) = backend.agent.dids.resolve(&issuer_did).await {
        tracing::error!("Could not resolve legacy DID, unable to sign credentials: {e:#}");
    }
    create_issuer(&backend.agent, &issuer_did)?;
    create_verifier(&backend.agent, &issuer_did)?;

    let public_url = backend_base_url(&config.server);
    let smart = SmartLauncher::from_config(
        &config.smart,
        &format!("{public_url}{SMART_ROUTER_PATH}/redirect"),
    )
    .map(Arc::new);
    match &smart {
        Some(launcher) => tracing::info!(iss = launcher.iss(), "SMART launch enabled"),
        None => tracing::warn!("No FHIR server configured (SMART_URL), issuing is unavailable"),
    }

    let state = AppState {
        agent: backend.agent,
        backend_did: backend.backend_did.into(),
        issuer_did: issuer_did.into(),
        prescriptions: Arc::new(backend.fhir.clone()),
        fhir: backend.fhir,
        smart,
        public_url,
    };
    run_gateway(&host, config.server.port, state, &config.server.public_dir).await
}

async fn create_did(config: Config) -> Result<()> {
    let backend = start(&config).await?;
    let (result, seed) = backend
        .agent
        .create_endorsed_did(&backend.backend_did)
        .await?;
    match result.did_state {
        DidState::Failed { reason, .. } => bail!("DID creation failed: {reason}"),
        did_state => {
            println!("DID:  {}", did_state.did().unwrap_or_default());
            println!("Seed: {seed}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.log.level)
        .parse::<Level>()
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(log_level).init();

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Did => create_did(config).await,
    }
}
