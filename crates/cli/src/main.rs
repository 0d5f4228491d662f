//! CMS Users CLI - Database migrations and user management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! cms-users migrate
//!
//! # Create the first superuser
//! cms-users users bootstrap -u admin -e admin@example.com
//!
//! # Manage users as an existing user
//! cms-users users list --as admin
//! cms-users users create --as admin -u editor -e editor@example.com --plugin refinery_pages
//! cms-users users update 2 --as editor --plugin refinery_authentication_devise
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `users` - Bootstrap, list, show, create and update users

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Args, Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cms_users_admin::config::{AdminConfig, LogFormat};
use cms_users_admin::db::{self, PgUserStore};
use cms_users_admin::services::LogInvitationSender;
use cms_users_core::PluginRegistry;

mod commands;

use commands::CliError;
use commands::users::{Context, UserArgs};

#[derive(Parser)]
#[command(name = "cms-users")]
#[command(author, version, about = "CMS user administration tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage users
    Users {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create the first superuser (only while no users exist)
    Bootstrap {
        /// Login name
        #[arg(short, long)]
        username: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Full name
        #[arg(long)]
        full_name: Option<String>,
    },
    /// List users
    List {
        /// Username of the acting user
        #[arg(long = "as")]
        actor: String,
    },
    /// Show a user and the roles/plugins that can be assigned
    Show {
        /// User ID
        id: i64,

        /// Username of the acting user
        #[arg(long = "as")]
        actor: String,
    },
    /// Create a user and send an invitation
    Create {
        /// Username of the acting user
        #[arg(long = "as")]
        actor: String,

        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Update a user's profile, roles and plugins
    Update {
        /// User ID
        id: i64,

        /// Username of the acting user
        #[arg(long = "as")]
        actor: String,

        #[command(flatten)]
        fields: FieldArgs,
    },
}

#[derive(Args)]
struct FieldArgs {
    /// Login name
    #[arg(short, long)]
    username: Option<String>,

    /// Email address
    #[arg(short, long)]
    email: Option<String>,

    /// Full name
    #[arg(long)]
    full_name: Option<String>,

    /// Plugin to grant (repeatable)
    #[arg(long = "plugin")]
    plugins: Vec<String>,

    /// Role to grant (repeatable)
    #[arg(long = "role")]
    roles: Vec<String>,
}

impl From<FieldArgs> for UserArgs {
    fn from(args: FieldArgs) -> Self {
        Self {
            username: args.username,
            email: args.email,
            full_name: args.full_name,
            plugins: args.plugins,
            roles: args.roles,
        }
    }
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &AdminConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Install the tracing subscriber (text or JSON, plus Sentry).
fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cms_users_admin=info,cms_users_cli=info".into());

    let json_layer = (format == LogFormat::Json)
        .then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (format == LogFormat::Text).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AdminConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);
    init_tracing(config.log_format);

    if let Err(e) = run(cli, config).await {
        if e.is_fatal() {
            tracing::error!("Command failed and left data inconsistent: {e}");
            std::process::exit(2);
        }
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: AdminConfig) -> Result<(), CliError> {
    let pool = db::create_pool(&config.database_url).await?;

    match cli.command {
        Commands::Migrate => commands::migrate::run(&pool).await?,
        Commands::Users { action } => {
            let ctx = Context {
                store: PgUserStore::new(pool),
                settings: config.settings,
                plugins: PluginRegistry::builtin(),
                invitations: LogInvitationSender,
            };

            match action {
                UserAction::Bootstrap {
                    username,
                    email,
                    full_name,
                } => commands::users::bootstrap(&ctx, &username, &email, full_name).await?,
                UserAction::List { actor } => commands::users::list(&ctx, &actor).await?,
                UserAction::Show { id, actor } => commands::users::show(&ctx, &actor, id).await?,
                UserAction::Create { actor, fields } => {
                    commands::users::create(&ctx, &actor, fields.into()).await?;
                }
                UserAction::Update { id, actor, fields } => {
                    commands::users::update(&ctx, &actor, id, fields.into()).await?;
                }
            }
        }
    }
    Ok(())
}
