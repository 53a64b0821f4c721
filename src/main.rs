//! palctl - game server console CLI

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use palctl::config::KEYS;
use palctl::logging::init_tracing;
use palctl::models::{
    BackupListQuery, BroadcastRequest, PlayerListQuery, RconCommand, RconSendRequest, ServerCreateRequest,
    ServerUpdateRequest, ShutdownRequest, SyncSource, WhitelistEntry,
};
use palctl::{get_config_value, set_config_value, ApiClient, Config, Paths, Registry, ServerRecord, Target};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "palctl")]
#[command(about = "Game server console - track servers, pick the active one, and manage it")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Address this server id instead of the active one
    #[arg(short, long, global = true, conflicts_with = "default")]
    server: Option<String>,

    /// Address the legacy default server (unscoped routes)
    #[arg(long, global = true)]
    default: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show resolved paths (for debugging)
    Paths,

    /// Get or set client configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    #[command(flatten)]
    Remote(RemoteCommand),
}

/// Commands that talk to the backend.
#[derive(Subcommand)]
enum RemoteCommand {
    /// List servers known to the backend
    Servers {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the active server
    Current {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Make a server the active one
    Use {
        /// Server ID
        id: String,
    },

    /// Register a new server with the backend
    Add {
        /// Server ID
        id: String,

        /// Display name
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Make the server eligible for automatic selection
        #[arg(long)]
        enabled: bool,

        /// Connection config as a JSON object (rcon, rest, save sections)
        #[arg(long)]
        config: Option<String>,
    },

    /// Change a registered server
    Update {
        /// Server ID
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        #[arg(long)]
        disable: bool,

        /// Connection config as a JSON object
        #[arg(long)]
        config: Option<String>,
    },

    /// Remove a server from the backend
    Remove {
        /// Server ID
        id: String,
    },

    /// Server version and name
    Info,

    /// Server FPS, player counts and uptime
    Metrics,

    /// Backend tool version
    Tool,

    /// Broadcast a message to all players
    Broadcast {
        message: String,
    },

    /// Shut the server down after a countdown
    Shutdown {
        /// Seconds before shutdown
        #[arg(long, default_value_t = 30)]
        seconds: u32,

        /// Message shown to players
        #[arg(long, default_value = "Server is shutting down")]
        message: String,
    },

    /// List players
    Players {
        /// Sort field (e.g. last_online, level)
        #[arg(long)]
        order_by: Option<String>,

        /// Sort descending
        #[arg(long)]
        desc: bool,
    },

    /// List online players
    Online,

    /// Show one player
    Player {
        player_uid: String,
    },

    /// Kick a player
    Kick {
        player_uid: String,
    },

    /// Ban a player
    Ban {
        player_uid: String,
    },

    /// Lift a ban
    Unban {
        player_uid: String,
    },

    /// List guilds
    Guilds,

    /// Show a guild by its admin's player uid
    Guild {
        admin_player_uid: String,
    },

    /// Manage the whitelist
    Whitelist {
        #[command(subcommand)]
        action: WhitelistAction,
    },

    /// Manage and run saved RCON commands
    Rcon {
        #[command(subcommand)]
        action: RconAction,
    },

    /// Manage save backups
    Backups {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Ask the backend to resync player data
    Sync {
        #[arg(long, value_enum, default_value_t = SyncFrom::Rest)]
        from: SyncFrom,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get config value(s)
    Get {
        /// Specific key (omit for all)
        key: Option<String>,
    },

    /// Set a config value
    Set {
        /// Config key
        key: String,

        /// Config value
        value: String,
    },
}

#[derive(Subcommand)]
enum WhitelistAction {
    /// Show the whitelist
    List,

    /// Add an entry
    Add {
        #[command(flatten)]
        entry: EntryArgs,
    },

    /// Remove an entry
    Remove {
        #[command(flatten)]
        entry: EntryArgs,
    },

    /// Replace the whole whitelist from a JSON file
    Replace {
        file: PathBuf,
    },
}

#[derive(clap::Args)]
struct EntryArgs {
    #[arg(long, default_value = "")]
    name: String,

    #[arg(long, default_value = "")]
    steam_id: String,

    #[arg(long, default_value = "")]
    player_uid: String,
}

impl From<EntryArgs> for WhitelistEntry {
    fn from(args: EntryArgs) -> Self {
        WhitelistEntry {
            name: args.name,
            steam_id: args.steam_id,
            player_uid: args.player_uid,
        }
    }
}

#[derive(Subcommand)]
enum RconAction {
    /// List saved commands
    List,

    /// Run a saved command
    Send {
        uuid: String,

        /// Fills the command's placeholder
        #[arg(default_value = "")]
        content: String,
    },

    /// Save a new command
    Add {
        #[command(flatten)]
        command: RconArgs,
    },

    /// Change a saved command
    Update {
        uuid: String,

        #[command(flatten)]
        command: RconArgs,
    },

    /// Delete a saved command
    Delete {
        uuid: String,
    },
}

#[derive(clap::Args)]
struct RconArgs {
    /// Command text sent over RCON
    command: String,

    #[arg(long, default_value = "")]
    placeholder: String,

    #[arg(long, default_value = "")]
    remark: String,
}

impl From<RconArgs> for RconCommand {
    fn from(args: RconArgs) -> Self {
        RconCommand {
            command: args.command,
            placeholder: args.placeholder,
            remark: args.remark,
        }
    }
}

#[derive(Subcommand)]
enum BackupAction {
    /// List backups, optionally within a time range
    List {
        /// Start, in milliseconds since the Unix epoch
        #[arg(long)]
        start: Option<i64>,

        /// End, in milliseconds since the Unix epoch
        #[arg(long)]
        end: Option<i64>,
    },

    /// Delete a backup
    Remove {
        uuid: String,
    },

    /// Download a backup archive
    Download {
        uuid: String,

        /// Output file (default: backup-<uuid>.zip)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SyncFrom {
    Rest,
    Sav,
}

impl From<SyncFrom> for SyncSource {
    fn from(from: SyncFrom) -> Self {
        match from {
            SyncFrom::Rest => SyncSource::Rest,
            SyncFrom::Sav => SyncSource::Sav,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::resolve();
    let choice = TargetChoice {
        server: cli.server,
        default: cli.default,
    };

    match cli.command {
        Commands::Paths => {
            println!("Config file:  {}", paths.config_file().display());
            println!("State dir:    {}", paths.state_dir().display());
            println!("Config exists: {}", paths.config_file().exists());
            println!("Active server stored: {}", paths.active_server_store().path().exists());
            Ok(())
        }
        Commands::Config { action } => run_config(&paths, action),
        Commands::Remote(command) => run_remote(&paths, command, &choice),
    }
}

fn run_remote(paths: &Paths, command: RemoteCommand, choice: &TargetChoice) -> anyhow::Result<()> {
    let config = Config::load(paths.config_file())?;
    let api = ApiClient::new(&config)?;
    let registry = Registry::new(paths.active_server_store());
    let mut session = Session { api, registry };

    match command {
        RemoteCommand::Servers { json } => {
            session.refresh()?;
            if json {
                return print_json(session.registry.servers());
            }
            print_server_table(&session.registry);
            Ok(())
        }
        RemoteCommand::Current { json } => match session.registry.active_server() {
            Some(active) if json => print_json(active),
            Some(active) => {
                print_server(active, true);
                Ok(())
            }
            None => {
                println!("No active server. Pick one with: palctl use <id>");
                Ok(())
            }
        },
        RemoteCommand::Use { id } => {
            session.refresh()?;
            let Some(record) = session.registry.server_by_id(&id).cloned() else {
                bail!("Server not found: {}", id);
            };
            if !record.enabled {
                eprintln!("Warning: {} is disabled", id);
            }
            session.registry.set_active_server(record);
            println!("Active server: {}", id);
            Ok(())
        }
        RemoteCommand::Add {
            id,
            name,
            description,
            enabled,
            config,
        } => {
            let request = ServerCreateRequest {
                id: id.clone(),
                name,
                description,
                enabled,
                config: parse_object(config.as_deref())?.unwrap_or_default(),
            };
            session.refresh()?;
            session.api.create_server(&request)?;
            let record = session.api.get_server(&id)?;
            session.registry.add_server(record);
            println!("Added {}", id);
            Ok(())
        }
        RemoteCommand::Update {
            id,
            name,
            description,
            enable,
            disable,
            config,
        } => {
            let request = ServerUpdateRequest {
                name,
                description,
                enabled: match (enable, disable) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                config: parse_object(config.as_deref())?,
            };
            if request.is_empty() {
                bail!("Nothing to update; pass --name, --description, --enable/--disable or --config");
            }
            session.refresh()?;
            session.api.update_server(&id, &request)?;
            session.registry.update_server(&id, &request.to_patch());
            println!("Updated {}", id);
            Ok(())
        }
        RemoteCommand::Remove { id } => {
            session.refresh()?;
            session.api.delete_server(&id)?;
            session.registry.remove_server(&id);
            println!("Removed {}", id);
            match session.registry.active_server() {
                Some(active) => println!("Active server: {}", active.id),
                None => println!("No active server."),
            }
            Ok(())
        }
        RemoteCommand::Tool => print_json(&session.api.server_tool_info()?),
        RemoteCommand::Info => {
            let id = session.target_id(choice)?;
            print_json(&session.api.server_info(Target::from_option(id.as_deref()))?)
        }
        RemoteCommand::Metrics => {
            let id = session.target_id(choice)?;
            print_json(&session.api.server_metrics(Target::from_option(id.as_deref()))?)
        }
        RemoteCommand::Broadcast { message } => {
            let id = session.target_id(choice)?;
            let target = Target::from_option(id.as_deref());
            print_json(&session.api.broadcast(target, &BroadcastRequest { message })?)
        }
        RemoteCommand::Shutdown { seconds, message } => {
            let id = session.target_id(choice)?;
            let target = Target::from_option(id.as_deref());
            tracing::info!(%target, seconds, "requesting shutdown");
            print_json(&session.api.shutdown(target, &ShutdownRequest { seconds, message })?)
        }
        RemoteCommand::Players { order_by, desc } => {
            let id = session.target_id(choice)?;
            let query = PlayerListQuery {
                order_by,
                desc: desc.then_some(true),
            };
            print_json(&session.api.player_list(Target::from_option(id.as_deref()), &query)?)
        }
        RemoteCommand::Online => {
            let id = session.target_id(choice)?;
            print_json(&session.api.online_players(Target::from_option(id.as_deref()))?)
        }
        RemoteCommand::Player { player_uid } => {
            let id = session.target_id(choice)?;
            print_json(&session.api.player(Target::from_option(id.as_deref()), &player_uid)?)
        }
        RemoteCommand::Kick { player_uid } => {
            let id = session.target_id(choice)?;
            print_json(&session.api.kick_player(Target::from_option(id.as_deref()), &player_uid)?)
        }
        RemoteCommand::Ban { player_uid } => {
            let id = session.target_id(choice)?;
            print_json(&session.api.ban_player(Target::from_option(id.as_deref()), &player_uid)?)
        }
        RemoteCommand::Unban { player_uid } => {
            let id = session.target_id(choice)?;
            print_json(&session.api.unban_player(Target::from_option(id.as_deref()), &player_uid)?)
        }
        RemoteCommand::Guilds => {
            let id = session.target_id(choice)?;
            print_json(&session.api.guild_list(Target::from_option(id.as_deref()))?)
        }
        RemoteCommand::Guild { admin_player_uid } => {
            let id = session.target_id(choice)?;
            print_json(&session.api.guild(Target::from_option(id.as_deref()), &admin_player_uid)?)
        }
        RemoteCommand::Whitelist { action } => {
            let id = session.target_id(choice)?;
            let target = Target::from_option(id.as_deref());
            let response = match action {
                WhitelistAction::List => session.api.whitelist(target)?,
                WhitelistAction::Add { entry } => session.api.add_whitelist(target, &entry.into())?,
                WhitelistAction::Remove { entry } => session.api.remove_whitelist(target, &entry.into())?,
                WhitelistAction::Replace { file } => {
                    let content = std::fs::read_to_string(&file)
                        .with_context(|| format!("Failed to read {}", file.display()))?;
                    let entries: Vec<WhitelistEntry> = serde_json::from_str(&content)
                        .with_context(|| format!("{} is not a JSON array of whitelist entries", file.display()))?;
                    session.api.put_whitelist(target, &entries)?
                }
            };
            print_json(&response)
        }
        RemoteCommand::Rcon { action } => {
            let id = session.target_id(choice)?;
            let target = Target::from_option(id.as_deref());
            let response = match action {
                RconAction::List => session.api.rcon_commands(target)?,
                RconAction::Send { uuid, content } => {
                    session.api.send_rcon_command(target, &RconSendRequest { uuid, content })?
                }
                RconAction::Add { command } => session.api.add_rcon_command(target, &command.into())?,
                RconAction::Update { uuid, command } => {
                    session.api.update_rcon_command(target, &uuid, &command.into())?
                }
                RconAction::Delete { uuid } => session.api.remove_rcon_command(target, &uuid)?,
            };
            print_json(&response)
        }
        RemoteCommand::Backups { action } => {
            let id = session.target_id(choice)?;
            let target = Target::from_option(id.as_deref());
            match action {
                BackupAction::List { start, end } => {
                    let query = BackupListQuery {
                        start_time: start,
                        end_time: end,
                    };
                    print_json(&session.api.backup_list(target, &query)?)
                }
                BackupAction::Remove { uuid } => print_json(&session.api.remove_backup(target, &uuid)?),
                BackupAction::Download { uuid, output } => {
                    let bytes = session.api.download_backup(target, &uuid)?;
                    let output = output.unwrap_or_else(|| PathBuf::from(format!("backup-{}.zip", uuid)));
                    std::fs::write(&output, &bytes)
                        .with_context(|| format!("Failed to write {}", output.display()))?;
                    println!("Saved {} bytes to {}", bytes.len(), output.display());
                    Ok(())
                }
            }
        }
        RemoteCommand::Sync { from } => {
            let id = session.target_id(choice)?;
            print_json(&session.api.sync(Target::from_option(id.as_deref()), from.into())?)
        }
    }
}

fn run_config(paths: &Paths, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            set_config_value(paths.config_file(), &key, &value)?;
            println!("Set {} = {}", key, value);
        }
        ConfigAction::Get { key } => {
            let config = Config::load(paths.config_file())?;
            match key {
                Some(k) => println!("{}", get_config_value(&config, &k)?),
                None => {
                    for k in KEYS {
                        println!("{} = {}", k, get_config_value(&config, k)?);
                    }
                }
            }
        }
    }
    Ok(())
}

/// How the user asked to pick the server for a per-server command.
struct TargetChoice {
    server: Option<String>,
    default: bool,
}

/// One CLI invocation: the API client plus the registry it feeds.
struct Session {
    api: ApiClient,
    registry: Registry,
}

impl Session {
    /// Refetch the server list into the registry.
    fn refresh(&mut self) -> anyhow::Result<()> {
        self.registry.set_loading(true);
        let result = self.api.list_servers();
        self.registry.set_loading(false);
        let servers = result.context("Failed to fetch server list")?;
        self.registry.set_servers(servers);
        if self.registry.active_server().is_some() && !self.registry.active_is_listed() {
            tracing::warn!("active server is no longer listed by the backend");
        }
        Ok(())
    }

    /// Server id to address, or `None` for the default routes. Explicit flags
    /// win; then the active server; then whatever a fresh list auto-selects.
    fn target_id(&mut self, choice: &TargetChoice) -> anyhow::Result<Option<String>> {
        if choice.default {
            return Ok(None);
        }
        if let Some(ref id) = choice.server {
            return Ok(Some(id.clone()));
        }
        if let Some(active) = self.registry.active_server() {
            return Ok(Some(active.id.clone()));
        }
        self.refresh()?;
        let id = self.registry.active_server().map(|s| s.id.clone());
        if id.is_none() {
            tracing::info!("no enabled server registered; using default routes");
        }
        Ok(id)
    }
}

fn parse_object(raw: Option<&str>) -> anyhow::Result<Option<serde_json::Map<String, serde_json::Value>>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str::<serde_json::Value>(raw).context("--config is not valid JSON")? {
        serde_json::Value::Object(map) => Ok(Some(map)),
        _ => bail!("--config must be a JSON object"),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_server_table(registry: &Registry) {
    if registry.servers().is_empty() {
        println!("No servers registered.");
        return;
    }
    let active_id = registry.active_server().map(|s| s.id.as_str());
    for s in registry.servers() {
        print_server(s, active_id == Some(s.id.as_str()));
    }
    if let Some(id) = active_id.filter(|_| !registry.active_is_listed()) {
        println!("Active server {} is not in this list.", id);
    }
}

fn print_server(server: &ServerRecord, active: bool) {
    const INDENT: &str = "        ";

    let marker = if active { " (active)" } else { "" };
    println!("{}{}", server.id, marker);
    println!("{}Name:      {}", INDENT, server.name().unwrap_or("?"));
    println!("{}Enabled:   {}", INDENT, server.enabled);
    if let Some(d) = server.fields.get("description").and_then(|d| d.as_str()).filter(|d| !d.is_empty()) {
        println!("{}Summary:   {}", INDENT, d.lines().next().unwrap_or("").trim());
    }
    if let Some(status) = server.fields.get("status").and_then(|s| s.as_str()) {
        println!("{}Status:    {}", INDENT, status);
    }
    if let (Some(online), Some(max)) = (
        server.fields.get("online_count").and_then(|n| n.as_i64()),
        server.fields.get("max_players").and_then(|n| n.as_i64()),
    ) {
        println!("{}Players:   {}/{}", INDENT, online, max);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn local_and_remote_commands_parse_apart() {
        let cli = Cli::try_parse_from(["palctl", "paths"]).unwrap();
        assert!(matches!(cli.command, Commands::Paths));

        let cli = Cli::try_parse_from(["palctl", "config", "get"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { .. }));

        let cli = Cli::try_parse_from(["palctl", "--server", "s2", "use", "s1"]).unwrap();
        assert_eq!(cli.server.as_deref(), Some("s2"));
        match cli.command {
            Commands::Remote(RemoteCommand::Use { id }) => assert_eq!(id, "s1"),
            _ => panic!("expected a remote use command"),
        }
    }

    #[test]
    fn server_and_default_conflict() {
        assert!(Cli::try_parse_from(["palctl", "--server", "s1", "--default", "info"]).is_err());
    }
}
