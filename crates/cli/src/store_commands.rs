use std::path::Path;

use {
    anyhow::{Context, Result},
    clap::Subcommand,
    hotline_protocol::{MessageId, Role, UserId},
    hotline_store::{MessageStore, NewUser, SqliteStore},
};

#[derive(Subcommand)]
pub enum UserAction {
    /// List registered users, ordered by name.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Register a user.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        company: String,
        /// Text shown to the user after login.
        #[arg(long)]
        cover_letter: Option<String>,
    },
    /// Delete a user and their conversation.
    Remove { id: UserId },
}

#[derive(Subcommand)]
pub enum MessageAction {
    /// Print a conversation, or every message when no user is given.
    List {
        #[arg(long)]
        user: Option<UserId>,
        #[arg(long)]
        json: bool,
    },
    /// Delete a single message by id.
    Delete { id: MessageId },
}

async fn open_store(path: &Path) -> Result<SqliteStore> {
    SqliteStore::open(path)
        .await
        .with_context(|| format!("open database {}", path.display()))
}

/// Run one user action. The store is closed whether or not it succeeds.
pub async fn handle_users(action: UserAction, db_path: &Path) -> Result<()> {
    let store = open_store(db_path).await?;
    let result = run_user_action(&store, action).await;
    store.close().await;
    result
}

async fn run_user_action(store: &SqliteStore, action: UserAction) -> Result<()> {
    match action {
        UserAction::List { json } => list_users(store, json).await,
        UserAction::Add {
            name,
            company,
            cover_letter,
        } => {
            let user = store
                .create_user(NewUser {
                    name,
                    company,
                    cover_letter,
                })
                .await?;
            println!("created user {} ({})", user.id, user.name);
            Ok(())
        },
        UserAction::Remove { id } => {
            if store.delete_user(id).await? {
                println!("removed user {id}");
            } else {
                println!("no user with id {id}");
            }
            Ok(())
        },
    }
}

async fn list_users(store: &SqliteStore, json: bool) -> Result<()> {
    let users = store.list_users().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }
    if users.is_empty() {
        println!("no users");
    }
    for user in users {
        println!("{:>6}  {}", user.id, user.name);
    }
    Ok(())
}

pub async fn handle_messages(action: MessageAction, db_path: &Path) -> Result<()> {
    let store = open_store(db_path).await?;
    let result = run_message_action(&store, action).await;
    store.close().await;
    result
}

async fn run_message_action(store: &SqliteStore, action: MessageAction) -> Result<()> {
    match action {
        MessageAction::List { user, json } => list_messages(store, user, json).await,
        MessageAction::Delete { id } => {
            if store.delete_by_id(id).await? {
                println!("deleted message {id}");
            } else {
                println!("no message with id {id}");
            }
            Ok(())
        },
    }
}

async fn list_messages(store: &SqliteStore, user: Option<UserId>, json: bool) -> Result<()> {
    let role = match user {
        Some(id) => Role::from_wire(id)?,
        None => Role::Admin,
    };
    let messages = store.list_for(role).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }
    for m in messages {
        println!("{:>6}  [{}] {:<5} {}", m.id, m.user_id, m.sender_role, m.text);
    }
    Ok(())
}
