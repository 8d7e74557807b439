use clap::Parser;
use docvault::{
    Config,
    DataDir,
    Error,
    MemoryDb,
    Result,
    SnapshotDb,
    backend::{Backend, FileBackend, OwnerBackend, TagBackend},
    config,
    ids::{FileId, OwnerId, OwnerKind},
    ingestion,
    model::{File, Group, Owner, User},
    tag::{FileTag, TagType},
};
use tracing_subscriber::EnvFilter;

pub mod cli;

use cli::{
    Cli,
    Command,
    ConfigAction,
    GroupAction,
    IngestArgs,
    OwnerArg,
    SearchArgs,
    ShareArgs,
    TagAction,
    TagEditArgs,
    TagListArgs,
    UserAction,
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCVAULT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let snapshots = SnapshotDb::open(&data_dir.snapshot_db())?;
    let vault = snapshots.load()?;

    // Commands that change records return `true` so the vault is saved.
    let changed = match cli.command {
        Command::User { action } => match action {
            UserAction::Add { name, email } => user_add(&vault, &name, email)?,
            UserAction::Info { name, json } => user_info(&vault, &name, json)?,
            UserAction::RoleAdd { name, role } => {
                user_role(&vault, &name, &role, true)?
            }
            UserAction::RoleRemove { name, role } => {
                user_role(&vault, &name, &role, false)?
            }
        },
        Command::Group { action } => match action {
            GroupAction::Add { name, owner } => {
                group_add(&vault, &name, &owner)?
            }
            GroupAction::Join { group, user } => {
                group_join(&vault, &group, &user)?
            }
        },
        Command::Ingest(args) => cmd_ingest(&vault, &args)?,
        Command::Tag { action } => match action {
            TagAction::Add(args) => tag_edit(&vault, &args, true)?,
            TagAction::Remove(args) => tag_edit(&vault, &args, false)?,
            TagAction::List(args) => tag_list(&vault, &args)?,
        },
        Command::Search(args) => cmd_search(&vault, &args)?,
        Command::Share(args) => cmd_share(&vault, &args)?,
        Command::Space(owner) => cmd_space(&vault, &owner)?,
        Command::Config { action } => cmd_config(&snapshots, action)?,
        Command::Status(args) => {
            cmd_status(&vault, &data_dir, args.json)?
        }
        Command::Completions(_) => false,
    };

    if changed {
        snapshots.save(&vault)?;
    }
    Ok(())
}

fn resolve_owner(vault: &MemoryDb, arg: &OwnerArg) -> Result<Owner> {
    let owners = vault.owners();
    if arg.group {
        Ok(owners.find_group_name(&arg.name)?.into())
    } else {
        Ok(owners.find_user_name(&arg.name)?.into())
    }
}

fn parse_file_id(vault: &MemoryDb, raw: &str) -> Result<File> {
    let id: FileId = raw.parse()?;
    vault.files().get(&id)
}

fn user_add(vault: &MemoryDb, name: &str, email: String) -> Result<bool> {
    let owners = vault.owners();
    let id = owners.reserve(OwnerId::new(OwnerKind::User), name)?;
    let mut user = User::new(id, name);
    user.email = email;
    owners.insert(&user.into())?;
    println!("Added user '{name}' ({id})");
    Ok(true)
}

fn user_info(vault: &MemoryDb, name: &str, json: bool) -> Result<bool> {
    let owners = vault.owners();
    let user = owners.find_user_name(name)?;
    let groups = owners.get_groups(&user.id)?;

    if json {
        let value = serde_json::json!({
            "id": user.id,
            "name": user.name,
            "email": user.email,
            "roles": user.roles,
            "owns": group_names(&groups.owned),
            "member_of": group_names(&groups.member),
            "space": owners.get_space(&user.id)?,
        });
        println!("{value}");
    } else {
        println!("id: {}", user.id);
        println!("name: {}", user.name);
        if !user.email.is_empty() {
            println!("email: {}", user.email);
        }
        let roles: Vec<&str> = user.roles.iter().map(String::as_str).collect();
        println!("roles: {}", roles.join(", "));
        println!("owns: {}", group_names(&groups.owned).join(", "));
        println!("member of: {}", group_names(&groups.member).join(", "));
    }
    Ok(false)
}

fn group_names(groups: &[Group]) -> Vec<String> {
    groups.iter().map(|g| g.name.clone()).collect()
}

fn user_role(
    vault: &MemoryDb,
    name: &str,
    role: &str,
    grant: bool,
) -> Result<bool> {
    let owners = vault.owners();
    let mut user = owners.find_user_name(name)?;
    let changed = if grant {
        user.add_role(role)
    } else {
        user.remove_role(role)
    };
    if !changed {
        println!("No change for '{name}'");
        return Ok(false);
    }
    owners.update(&user.into())?;
    let verb = if grant { "Granted" } else { "Revoked" };
    println!("{verb} role '{role}' for '{name}'");
    Ok(true)
}

fn group_add(vault: &MemoryDb, name: &str, owner: &str) -> Result<bool> {
    let owners = vault.owners();
    let leader = owners.find_user_name(owner)?;
    let id = owners.reserve(OwnerId::new(OwnerKind::Group), name)?;
    owners.insert(&Group::new(id, name, leader.id).into())?;
    println!("Added group '{name}' ({id}) owned by '{owner}'");
    Ok(true)
}

fn group_join(vault: &MemoryDb, group: &str, user: &str) -> Result<bool> {
    let owners = vault.owners();
    let mut target = owners.find_group_name(group)?;
    let member = owners.find_user_name(user)?;
    if !target.add_member(member.id) {
        println!("'{user}' is already a member of '{group}'");
        return Ok(false);
    }
    owners.update(&target.into())?;
    println!("Added '{user}' to '{group}'");
    Ok(true)
}

fn cmd_ingest(vault: &MemoryDb, args: &IngestArgs) -> Result<bool> {
    let owner = resolve_owner(vault, &args.owner)?;
    if let Some(limit) = vault.config().file_limit
        && std::fs::metadata(&args.path)?.len() > limit
    {
        return Err(Error::FileTooLarge { limit });
    }
    let bytes = std::fs::read(&args.path)?;
    let name = match &args.file_name {
        Some(name) => name.clone(),
        None => args
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::Config(format!(
                    "cannot derive a file name from {}",
                    args.path.display()
                ))
            })?,
    };
    let content_type = args
        .content_type
        .as_deref()
        .unwrap_or_else(|| ingestion::guess_content_type(&args.path));

    let done = ingestion::ingest_file(
        vault,
        vault.config(),
        File::new(owner.id(), name),
        content_type,
        bytes.as_slice(),
    )?;
    if !args.no_index {
        ingestion::index_file(vault, &done.file, &bytes)?;
    }

    let id = done.file.id()?;
    if done.deduplicated {
        println!("{id}\t{} (content already stored)", done.file.name);
    } else {
        println!("{id}\t{}", done.file.name);
    }
    Ok(true)
}

fn tag_edit(vault: &MemoryDb, args: &TagEditArgs, add: bool) -> Result<bool> {
    let file = parse_file_id(vault, &args.file)?;
    let owner = resolve_owner(vault, &args.owner)?;
    let id = file.id()?;
    let tags: Vec<FileTag> = args
        .tags
        .iter()
        .map(|tag| FileTag::new(id.clone(), owner.id(), tag.clone()))
        .collect();
    if add {
        vault.tags().upsert(&tags)?;
    } else {
        vault.tags().remove(&tags)?;
    }
    println!("Updated {} tag(s) on {id}", tags.len());
    Ok(true)
}

fn tag_list(vault: &MemoryDb, args: &TagListArgs) -> Result<bool> {
    let file = parse_file_id(vault, &args.file)?;
    let owner = resolve_owner(vault, &args.owner)?;
    let ty = args.ty.unwrap_or(TagType::ALLFILE | TagType::ALLSTORE);
    let tags = vault.tags().get_type(file.id()?, &owner.id(), ty)?;

    if args.json {
        let list: Vec<_> = tags.iter().map(|t| &t.tag).collect();
        println!("{}", serde_json::to_string(&list)?);
    } else if tags.is_empty() {
        println!("No tags.");
    } else {
        for t in &tags {
            println!("{}\t{}", t.tag.word, t.tag.ty);
        }
    }
    Ok(false)
}

fn cmd_search(vault: &MemoryDb, args: &SearchArgs) -> Result<bool> {
    let owner = resolve_owner(vault, &args.owner)?;
    let filters = args.all_filters();
    let tags = vault.tags();
    let mut hits = match &args.access {
        Some(key) => tags.search_access(&owner.id(), key, &filters)?,
        None => tags.search_owned(&owner.id(), &filters)?,
    };
    hits.sort();

    let files = vault.files();
    let mut found = Vec::with_capacity(hits.len());
    for id in &hits {
        found.push(files.get(id)?);
    }

    if args.json {
        let list: Vec<_> = found
            .iter()
            .map(|f| serde_json::json!({ "id": f.id, "name": f.name }))
            .collect();
        println!("{}", serde_json::Value::Array(list));
    } else if found.is_empty() {
        println!("No files match.");
    } else {
        for f in &found {
            println!("{}\t{}", f.id()?, f.name);
        }
        println!("\n{} match(es)", found.len());
    }
    Ok(false)
}

fn cmd_share(vault: &MemoryDb, args: &ShareArgs) -> Result<bool> {
    let mut file = parse_file_id(vault, &args.file)?;
    let with = resolve_owner(
        vault,
        &OwnerArg {
            name: args.with.clone(),
            group: args.group,
        },
    )?;
    file.share(args.key.clone(), with.id());
    vault.files().update(&file)?;
    println!(
        "Granted '{}' on {} to {} '{}'",
        args.key,
        file.id()?,
        with.kind(),
        with.name()
    );
    Ok(true)
}

fn cmd_space(vault: &MemoryDb, arg: &OwnerArg) -> Result<bool> {
    let owner = resolve_owner(vault, arg)?;
    let owners = vault.owners();
    let used = owners.get_space(&owner.id())?;
    let total = owners.get_total_space(&owner.id())?;
    println!("{} '{}': {used} of {total} bytes", owner.kind(), owner.name());
    Ok(false)
}

fn cmd_config(snapshots: &SnapshotDb, action: ConfigAction) -> Result<bool> {
    match action {
        ConfigAction::Get { key } => match snapshots.get_setting(&key)? {
            Some(value) => println!("{value}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            let known = [
                config::USER_QUOTA_KEY,
                config::GROUP_QUOTA_KEY,
                config::FILE_LIMIT_KEY,
            ];
            if !known.contains(&key.as_str()) {
                return Err(Error::Config(format!("unknown setting '{key}'")));
            }
            let previous = snapshots.get_setting(&key)?;
            snapshots.set_setting(&key, &value)?;
            if let Err(e) = Config::load(snapshots) {
                match previous {
                    Some(old) => snapshots.set_setting(&key, &old)?,
                    None => {
                        snapshots.remove_setting(&key)?;
                    }
                }
                return Err(e);
            }
            println!("Set {key} = {value}");
        }
        ConfigAction::List => {
            for (key, value) in snapshots.list_settings()? {
                println!("{key}\t{value}");
            }
            let effective = Config::load(snapshots)?;
            println!("# effective: {effective:?}");
        }
    }
    Ok(false)
}

fn cmd_status(
    vault: &MemoryDb,
    data_dir: &DataDir,
    json: bool,
) -> Result<bool> {
    let stats = vault.stats();
    if json {
        let value = serde_json::json!({
            "data_dir": data_dir.root().display().to_string(),
            "data_dir_source": data_dir.source().to_string(),
            "counts": stats,
        });
        println!("{value}");
    } else {
        println!(
            "Data directory: {} (from {})",
            data_dir.root().display(),
            data_dir.source()
        );
        for (what, count) in &stats {
            println!("{what}: {count}");
        }
    }
    Ok(false)
}
