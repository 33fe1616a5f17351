use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use portal::{
    PortalClient, PortalConfig,
    dashboard::{Dashboard, DashboardLoad},
    display::{EMPTY_HINT, EMPTY_TITLE, LIST_HEADING, ListView},
    login::LoginFlow,
    notify::{NotificationQueue, NoticeVariant},
};
use tracing_subscriber::{EnvFilter, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "portal", version, about = "Submit feedback and follow its classification")]
struct Cli {
    /// Create the account first, then sign in with it.
    #[arg(long)]
    sign_up: bool,

    #[arg(long, env = "FEEDBACK_EMAIL")]
    email: String,

    #[arg(long, env = "FEEDBACK_PASSWORD", hide_env_values = true)]
    password: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the feedback list and reprint it on every change (default).
    Watch,
    /// Submit one piece of feedback.
    Submit { title: String, description: String },
}

fn print_notifications(queue: &NotificationQueue) {
    for notice in queue.drain() {
        let marker = match notice.variant {
            NoticeVariant::Default => "*",
            NoticeVariant::Destructive => "!",
        };
        eprintln!("{marker} {}: {}", notice.title, notice.description);
    }
}

fn render(view: &ListView) {
    match view {
        ListView::Empty => {
            println!("{EMPTY_TITLE}");
            println!("{EMPTY_HINT}");
        }
        ListView::Cards { total, cards } => {
            println!("{LIST_HEADING} [{}]", total.label);
            for card in cards {
                let badges: Vec<_> = card.badges.iter().map(|b| b.label.as_str()).collect();
                println!();
                println!("{}  ({})  [{}]", card.title, card.age, badges.join(", "));
                println!("  {}", card.description);
                if let Some(banner) = card.banner {
                    println!("  ~ {banner}");
                }
            }
        }
    }
    println!("----");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_new(format!("warn,portal={log_level}"))
        .context("invalid tracing filter")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter),
        )
        .init();

    let cli = Cli::parse();

    let config = PortalConfig::from_env()?;
    let client = PortalClient::shared(&config)?;
    let notifications = Arc::new(NotificationQueue::new());

    let mut login = LoginFlow::new(client.clone(), notifications.clone());
    if cli.sign_up {
        login.toggle_mode();
        let result = login.submit(&cli.email, &cli.password).await;
        print_notifications(&notifications);
        result?;
    }
    let result = login.submit(&cli.email, &cli.password).await;
    print_notifications(&notifications);
    result?;

    let mut dashboard = match Dashboard::load(client, notifications.clone()).await {
        DashboardLoad::Ready(dashboard) => dashboard,
        DashboardLoad::Redirect(navigation) => {
            bail!("session rejected; go to {}", navigation.route.path())
        }
    };

    match cli.command.unwrap_or(Command::Watch) {
        Command::Submit { title, description } => {
            dashboard.form.set_title(title);
            dashboard.form.set_description(description);
            let _ = dashboard.form.submit().await;
            print_notifications(&notifications);
        }
        Command::Watch => {
            tracing::info!(email = %dashboard.user.email, "watching feedback (Ctrl+C to stop)");
            render(&dashboard.list_view());
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    alive = dashboard.list.changed() => {
                        if !alive {
                            break;
                        }
                        render(&ListView::build(&dashboard.list.items(), Utc::now()));
                    }
                }
            }
        }
    }

    if dashboard.logout().await.is_err() {
        print_notifications(&notifications);
        bail!("logout failed");
    }
    print_notifications(&notifications);
    Ok(())
}
