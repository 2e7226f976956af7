//! Projectdesk command line client
//!
//! Signs in against the Projectdesk API and browses projects. Remembered
//! logins survive between runs in a sled cookie jar; other logins last for a
//! single invocation, the way session cookies end with the browser.

use anyhow::{bail, Context};
use api_client::{ApiClient, ApiClientConfig};
use app_state::auth::policy::AUTH_TOKEN_COOKIE;
use app_state::{
    AuthStore, Credentials, FetchOutcome, ProjectsStore, ResetPasswordParams, Session,
    StoreContext,
};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::sync::Arc;
use storage::{CookieStore, KvCookieConfig, KvCookieStore};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "projectdesk")]
#[command(about = "Projectdesk CLI - Sign in and browse projects")]
#[command(version)]
struct Cli {
    /// Cookie jar location
    #[arg(long, env = "PROJECTDESK_COOKIE_PATH", default_value = "projectdesk_cookies.db")]
    cookie_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        /// Account email
        email: String,

        /// Account password
        #[arg(long, env = "PROJECTDESK_PASSWORD", hide_env_values = true)]
        password: String,

        /// Keep the session for 30 days
        #[arg(long, conflicts_with = "forget")]
        remember: bool,

        /// Forget a previously remembered login
        #[arg(long)]
        forget: bool,
    },

    /// Sign out
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Confirm an email address with the token from the verification mail
    VerifyEmail {
        /// Verification token
        token: String,
    },

    /// Request a password-reset email
    ForgotPassword {
        /// Account email
        email: String,
    },

    /// Set a new password with a reset token
    ResetPassword {
        /// Reset token
        token: String,

        /// New password
        #[arg(long, env = "PROJECTDESK_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show what a reset token refers to
    ResetTokenInfo {
        /// Reset token
        token: String,
    },

    /// Create an account from a JSON document
    Signup {
        /// Account fields as JSON, e.g. '{"email":"a@b.c","password":"pw"}'
        data: String,
    },

    /// Browse projects
    Projects {
        #[command(subcommand)]
        command: ProjectsCommand,
    },
}

#[derive(Subcommand)]
enum ProjectsCommand {
    /// List all projects
    List,

    /// Show one project
    Show {
        /// Project id
        id: String,
    },

    /// List a project's tasks
    Tasks {
        /// Project id
        id: String,

        /// Order by creation time, newest first
        #[arg(long)]
        newest_first: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Session as shown to the user: flags and profile, never the token
fn without_token(mut session: Session) -> Value {
    if let Some(user) = session.current_user.as_mut() {
        user.auth_token = None;
    }

    serde_json::json!({
        "currentUser": session.current_user,
        "verified": session.verified,
        "authenticated": session.authenticated,
        "isAdmin": session.ui.is_admin,
    })
}

fn report(outcome: FetchOutcome) -> anyhow::Result<()> {
    match outcome {
        FetchOutcome::Committed => Ok(()),
        FetchOutcome::NotCommitted { status } => bail!("server answered {} without content", status),
    }
}

/// Build the store context, presenting the stored token the way a browser
/// would send its cookie
fn context(cookie_path: &str) -> anyhow::Result<StoreContext> {
    let cookies = Arc::new(
        KvCookieStore::open(KvCookieConfig::new(cookie_path))
            .with_context(|| format!("opening cookie jar at {}", cookie_path))?,
    );

    let mut config = ApiClientConfig::from_env()?;
    if let Some(token) = cookies.get(AUTH_TOKEN_COOKIE) {
        config = config.with_header("Cookie", format!("{}={}", AUTH_TOKEN_COOKIE, token));
    }

    tracing::debug!(base_url = %config.base_url, "using API");
    let http = Arc::new(ApiClient::new(config)?);
    Ok(StoreContext::with_system_clock(http, cookies))
}

fn id_arg(raw: &str) -> app_state::EntityId {
    raw.parse::<i64>()
        .map(app_state::EntityId::Int)
        .unwrap_or_else(|_| app_state::EntityId::from(raw))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("loaded environment from {}", path.display());
    }
    init_tracing();

    let cli = Cli::parse();
    let ctx = context(&cli.cookie_path)?;
    let auth = AuthStore::new(ctx.clone());

    match cli.command {
        Commands::Login {
            email,
            password,
            remember,
            forget,
        } => {
            let mut credentials = Credentials::new(email, password);
            if remember || forget {
                credentials = credentials.remember(remember);
            }
            auth.login(&credentials).await?;
            auth.verify_user(true, true).await?;
            print_json(&auth.current_user())
        }
        Commands::Logout => {
            auth.logout().await?;
            println!("signed out");
            Ok(())
        }
        Commands::Whoami => {
            auth.verify_user(true, false).await?;
            print_json(&without_token(auth.snapshot()))
        }
        Commands::VerifyEmail { token } => {
            auth.verify_user_email(&token).await?;
            println!("email verified");
            Ok(())
        }
        Commands::ForgotPassword { email } => {
            auth.forgot_password(&email).await?;
            println!("reset instructions sent to {}", email);
            Ok(())
        }
        Commands::ResetPassword { token, password } => {
            let response = auth
                .reset_password(&ResetPasswordParams { password, token })
                .await?;
            print_json(&response.data)
        }
        Commands::ResetTokenInfo { token } => {
            let response = auth.get_reset_token_info(&token).await?;
            print_json(&response.data)
        }
        Commands::Signup { data } => {
            let data: Value = serde_json::from_str(&data).context("signup data is not JSON")?;
            print_json(&auth.sign_up(&data).await?)
        }
        Commands::Projects { command } => {
            let projects = ProjectsStore::new(ctx);
            match command {
                ProjectsCommand::List => {
                    report(projects.get_projects().await?)?;
                    print_json(&projects.list())
                }
                ProjectsCommand::Show { id } => {
                    report(projects.get_project_by_id(id_arg(&id)).await?)?;
                    print_json(&projects.project())
                }
                ProjectsCommand::Tasks { id, newest_first } => {
                    let id = id_arg(&id);
                    if !newest_first {
                        report(projects.get_project_tasks(id).await?)?;
                        return print_json(&projects.project_tasks());
                    }

                    report(projects.get_project_by_id(id).await?)?;
                    let project = projects.project().context("no project returned")?;
                    print_json(&project.tasks_newest_first())
                }
            }
        }
    }
}
