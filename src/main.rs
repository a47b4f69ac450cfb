use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use team_reviewers::config::{
    AssignConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_PROPORTION, DEFAULT_SHUTDOWN_GRACE,
    ServerConfig,
};
use team_reviewers::github::GithubClient;
use team_reviewers::handlers::Context;
use team_reviewers::{AssignError, Assigner, PullRequestRef, logger, server};
use tokio_util::sync::CancellationToken;
use tracing as log;

/// Requests individual reviewers from the teams asked to review a pull request.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assigns individuals to a pull request.
    ///
    /// The pull request must already have one or more teams requested as
    /// reviewers.
    ///
    /// Example: team-reviewers assign https://github.com/acme/foo/pull/123
    Assign {
        /// URL of the pull request.
        url: String,

        #[command(flatten)]
        assign: AssignArgs,
    },
    /// Starts a server receiving webhooks that prompt assignment.
    ///
    /// Upon receipt of `pull_request` events whose action is
    /// `ready_for_review`, individuals who are members of the requested teams
    /// are assigned. Deliveries are validated against GITHUB_WEBHOOK_SECRET.
    Serve {
        /// Host that the server is to serve from.
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,

        /// Port that the server is to listen on.
        #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Skips webhook validation. Only use this for local testing.
        #[arg(long)]
        insecure: bool,

        /// Secret used to validate webhook deliveries.
        #[arg(long, env = "GITHUB_WEBHOOK_SECRET", hide_env_values = true)]
        webhook_secret: Option<String>,

        /// Seconds to wait for in-flight deliveries when shutting down.
        #[arg(long, default_value_t = DEFAULT_SHUTDOWN_GRACE.as_secs())]
        shutdown_grace_secs: u64,

        #[command(flatten)]
        assign: AssignArgs,
    },
}

#[derive(Args, Debug)]
struct AssignArgs {
    /// Fraction of the teams' members to request as reviewers.
    #[arg(long, default_value_t = DEFAULT_PROPORTION)]
    proportion: f64,

    /// Pick reviewers and log them, but do not request them.
    #[arg(long)]
    dry_run: bool,
}

impl From<AssignArgs> for AssignConfig {
    fn from(args: AssignArgs) -> Self {
        AssignConfig {
            proportion: args.proportion,
            dry_run: args.dry_run,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logger::init(cli.debug);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Assign { url, assign } => {
            let pr = PullRequestRef::from_url(&url).context("parsing URL")?;
            let gh = GithubClient::new_from_env()?;
            let assigner = Assigner::new(Arc::new(gh), assign.into());

            let result = tokio::select! {
                result = assigner.assign(&pr) => result,
                _ = tokio::signal::ctrl_c() => anyhow::bail!("interrupted"),
            };
            match result {
                Ok(_) => println!("{pr}"),
                Err(AssignError::NoTeamsAssigned) => {
                    println!("No teams are currently assigned as reviewers!");
                }
                Err(e) => return Err(e).with_context(|| format!("assigning reviewers to {pr}")),
            }
            Ok(())
        }
        Command::Serve {
            host,
            port,
            insecure,
            webhook_secret,
            shutdown_grace_secs,
            assign,
        } => {
            let config = ServerConfig {
                host,
                port,
                webhook_secret: webhook_secret.map(SecretString::from),
                insecure,
                shutdown_grace: Duration::from_secs(shutdown_grace_secs),
            };
            config.validate()?;
            if config.insecure {
                log::warn!("webhook signature validation is disabled");
            }

            let gh = GithubClient::new_from_env()?;
            let ctx = Arc::new(Context {
                assigner: Assigner::new(Arc::new(gh), assign.into()),
                webhook_secret: config.signing_secret(),
                abort: CancellationToken::new(),
            });
            server::serve(&config, ctx, server::shutdown_signal()).await
        }
    }
}
