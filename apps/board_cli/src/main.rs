use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    config::load_settings_from, connect, load_settings, BoardReconciler, MoveOutcome,
    MoveRequest, Notification,
};
use shared::{
    domain::{ContextKey, ItemId, Lane, Priority},
    protocol::{ItemPatch, NewItem},
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "board", about = "Drive a kanban board against its REST backend")]
struct Cli {
    /// Settings file; defaults to ./board.toml when present.
    #[arg(long)]
    settings: Option<PathBuf>,
    #[arg(long)]
    server_url: Option<String>,
    /// Project or workspace the board is scoped to.
    #[arg(long)]
    context: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every lane in column order.
    Show,
    Move {
        item_id: String,
        #[arg(long)]
        from: Lane,
        #[arg(long)]
        from_index: usize,
        #[arg(long)]
        to: Lane,
        #[arg(long, default_value_t = 0)]
        to_index: usize,
    },
    Create {
        title: String,
        #[arg(long, default_value = "backlog")]
        lane: Lane,
        #[arg(long, value_enum, default_value_t = PriorityArg::Medium)]
        priority: PriorityArg,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    Edit {
        item_id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, value_enum)]
        priority: Option<PriorityArg>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    Archive {
        item_id: String,
    },
    Delete {
        item_id: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PriorityArg {
    Low,
    Medium,
    High,
    Urgent,
}

impl From<PriorityArg> for Priority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Medium => Priority::Medium,
            PriorityArg::High => Priority::High,
            PriorityArg::Urgent => Priority::Urgent,
        }
    }
}

fn print_notification(notification: Notification) {
    let marker = if notification.is_error() { "!!" } else { "ok" };
    println!("[{marker}] {}", notification.message);
}

async fn print_board(board: &BoardReconciler) {
    for (lane, items) in board.board().await {
        println!("{lane} ({})", items.len());
        for (index, item) in items.iter().enumerate() {
            let assignee = item.assignee.as_deref().unwrap_or("-");
            println!(
                "  {index:>2}. {} [{:?}] {} @{assignee}",
                item.id, item.priority, item.title
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => load_settings_from(path)?,
        None => load_settings()?,
    };
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    if let Some(context) = cli.context {
        settings.context = ContextKey::new(context);
    }
    debug!(?settings, "resolved settings");

    let (board, _selector) = connect(&settings, Arc::new(print_notification))
        .with_context(|| format!("failed to set up board client for {}", settings.server_url))?;
    board
        .load_all()
        .await
        .context("could not load the board")?;

    match cli.command {
        Command::Show => {}
        Command::Move {
            item_id,
            from,
            from_index,
            to,
            to_index,
        } => {
            let outcome = board
                .move_item(MoveRequest::new(item_id.clone(), (from, from_index), (to, to_index)))
                .await;
            match outcome {
                MoveOutcome::Committed | MoveOutcome::Unchanged => {}
                MoveOutcome::Ignored => {
                    bail!("{item_id} is not at position {from_index} of lane {from}")
                }
                MoveOutcome::RolledBack(err) => bail!("move of {item_id} was rejected: {err}"),
            }
        }
        Command::Create {
            title,
            lane,
            priority,
            assignee,
            due,
        } => {
            let mut new_item = NewItem::new(title, lane);
            new_item.priority = priority.into();
            new_item.assignee = assignee;
            new_item.due_date = due;
            board.create_item(new_item).await?;
        }
        Command::Edit {
            item_id,
            title,
            priority,
            assignee,
            description,
            due,
        } => {
            let patch = ItemPatch {
                title,
                priority: priority.map(Priority::from),
                assignee,
                description,
                due_date: due,
                archived: None,
            };
            if patch.is_empty() {
                bail!("nothing to edit: pass at least one field");
            }
            board.update_item(&ItemId::new(item_id), patch).await?;
        }
        Command::Archive { item_id } => {
            board.archive_item(&ItemId::new(item_id)).await?;
        }
        Command::Delete { item_id } => {
            board.delete_item(&ItemId::new(item_id)).await?;
        }
    }

    print_board(&board).await;
    Ok(())
}
