//! Group relay terminal client
//!
//! Line-oriented front end over a `Session`. Renders deltas as text and
//! turns typed commands into requests.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use group_relay::{AppError, ClientConfig, ClientId, Group, GroupId, Session, SessionObserver};

const HELP: &str = "\
commands:
  register                     announce yourself for invitations
  leave                        deregister and disconnect
  create <name> [ids...]       create a group with the given members
  edit <group> <name> [ids...] rename a group and replace its members
  say <group> <text...>        send a message
  attach <group> <path>        send a file as an attachment
  groups                       list your groups
  users                        list registered users";

/// Prints every delta to stdout
struct Terminal;

impl SessionObserver for Terminal {
    fn on_identifier_assigned(&self, client_id: ClientId) {
        println!("* you are client {}", client_id);
    }

    fn on_registered_users_changed(&self, users: &[ClientId]) {
        println!("* registered users: {:?}", users.iter().map(|u| u.0).collect::<Vec<_>>());
    }

    fn on_group_changed(&self, group: &Group, still_member: bool) {
        if still_member {
            println!("* group {}", group);
        } else {
            println!("* removed from group {} ({})", group.name, group.id);
        }
    }

    fn on_message_received(&self, group: &Group) {
        if let Some(msg) = group.last_message() {
            println!("[{}] {}: {}", group.name, msg.sender, msg.preview());
        }
    }

    fn on_disconnected(&self) {
        println!("* connection severed or server shut down");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("group_relay=warn")),
        )
        .init();

    let config = ClientConfig::from_env();
    let session = Session::connect(&config.url(), Terminal).await?;
    session.request_register()?;
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Err(e) = run_command(&session, line.trim()).await {
                    error!("Command failed: {}", e);
                    println!("! {}", e);
                }
                if session.is_closed() {
                    break;
                }
            }
            _ = session.closed() => break,
        }
    }

    info!("Client exiting");
    Ok(())
}

async fn run_command(session: &Session, line: &str) -> Result<(), AppError> {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("register") => session.request_register(),
        Some("leave") => session.request_deregister().await,
        Some("create") => {
            let Some(name) = words.next() else {
                println!("usage: create <name> [ids...]");
                return Ok(());
            };
            session.request_create_group(name, parse_ids(words))
        }
        Some("edit") => {
            let (Some(id), Some(name)) = (words.next().and_then(parse_group), words.next()) else {
                println!("usage: edit <group> <name> [ids...]");
                return Ok(());
            };
            session.request_edit_group(id, name, parse_ids(words)).await
        }
        Some("say") => {
            let Some(id) = words.next().and_then(parse_group) else {
                println!("usage: say <group> <text...>");
                return Ok(());
            };
            let text = words.collect::<Vec<_>>().join(" ");
            session.send_message(id, text, Vec::new())
        }
        Some("attach") => {
            let (Some(id), Some(path)) = (words.next().and_then(parse_group), words.next()) else {
                println!("usage: attach <group> <path>");
                return Ok(());
            };
            let blob = tokio::fs::read(path).await?;
            session.send_message(id, "", vec![blob])
        }
        Some("groups") => {
            for group in session.groups().await {
                let preview = group.last_message().map(|m| m.preview().to_string());
                println!(
                    "  {} - {}",
                    group,
                    preview.as_deref().unwrap_or("Click to start chatting")
                );
            }
            Ok(())
        }
        Some("users") => {
            println!("  {:?}", session.registered_users().await);
            Ok(())
        }
        Some(_) => {
            println!("{}", HELP);
            Ok(())
        }
        None => Ok(()),
    }
}

fn parse_group(word: &str) -> Option<GroupId> {
    word.parse().ok().map(GroupId)
}

fn parse_ids<'a>(words: impl Iterator<Item = &'a str>) -> Vec<ClientId> {
    words.filter_map(|w| w.parse().ok().map(ClientId)).collect()
}
