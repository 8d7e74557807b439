use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use docvault::tag::{Tag, TagType};

#[derive(Debug, Parser)]
#[command(
    name = "docvault",
    about = "Administer a content-addressed document vault and its tag index"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage groups
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },
    /// Store a file for an owner, deduplicating its content
    Ingest(IngestArgs),
    /// Edit and inspect the tags of a file
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Find files whose tags satisfy every filter
    Search(SearchArgs),
    /// Grant another owner a permission on a file
    Share(ShareArgs),
    /// Show an owner's consumed and allotted space
    Space(OwnerArg),
    /// Read or change vault settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show record counts
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

/// An owner named on the command line.
#[derive(Debug, Clone, clap::Args)]
pub struct OwnerArg {
    /// Owner name
    #[arg(long = "owner")]
    pub name: String,

    /// Resolve the name as a group rather than a user
    #[arg(long)]
    pub group: bool,
}

// -- Users --

#[derive(Debug, Subcommand)]
pub enum UserAction {
    /// Create a user
    Add {
        name: String,
        #[arg(long, default_value = "")]
        email: String,
    },
    /// Show a user and the groups they own or belong to
    Info {
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Grant a role
    RoleAdd { name: String, role: String },
    /// Revoke a role
    RoleRemove { name: String, role: String },
}

// -- Groups --

#[derive(Debug, Subcommand)]
pub enum GroupAction {
    /// Create a group owned by a user
    Add {
        name: String,
        /// Name of the owning user
        #[arg(long)]
        owner: String,
    },
    /// Add a user to a group
    Join { group: String, user: String },
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// File to store
    pub path: PathBuf,

    #[command(flatten)]
    pub owner: OwnerArg,

    /// Stored file name (defaults to the path's file name)
    #[arg(long = "name")]
    pub file_name: Option<String>,

    /// Content type (guessed from the extension if omitted)
    #[arg(long)]
    pub content_type: Option<String>,

    /// Skip populating tags from the content and name
    #[arg(long)]
    pub no_index: bool,
}

// -- Tags --

#[derive(Debug, Subcommand)]
pub enum TagAction {
    /// Upsert tags given as TYPES:word (e.g. name:report, topic|user:q3)
    Add(TagEditArgs),
    /// Clear the given type bits from tags given as TYPES:word
    Remove(TagEditArgs),
    /// Show the merged tags of a file
    List(TagListArgs),
}

#[derive(Debug, Parser)]
pub struct TagEditArgs {
    /// File id
    pub file: String,

    #[command(flatten)]
    pub owner: OwnerArg,

    #[arg(required = true, value_parser = parse_tag)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Parser)]
pub struct TagListArgs {
    /// File id
    pub file: String,

    #[command(flatten)]
    pub owner: OwnerArg,

    /// Restrict to these types (e.g. name|content)
    #[arg(long = "type", value_parser = parse_type)]
    pub ty: Option<TagType>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    #[command(flatten)]
    pub owner: OwnerArg,

    /// Search files shared with the owner under this permission key
    /// instead of the files they own
    #[arg(long)]
    pub access: Option<String>,

    /// Exact-match filter, TYPES:word
    #[arg(short = 'f', long = "filter", value_parser = parse_tag)]
    pub filters: Vec<Tag>,

    /// Regex filter, TYPES:pattern
    #[arg(short = 'r', long = "regex", value_parser = parse_regex)]
    pub regexes: Vec<Tag>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    pub fn all_filters(&self) -> Vec<Tag> {
        self.filters
            .iter()
            .chain(&self.regexes)
            .cloned()
            .collect()
    }
}

// -- Share --

#[derive(Debug, Parser)]
pub struct ShareArgs {
    /// File id
    pub file: String,

    /// Name of the owner receiving the permission
    #[arg(long)]
    pub with: String,

    /// Resolve `--with` as a group
    #[arg(long)]
    pub group: bool,

    /// Permission key
    #[arg(long, default_value = "view")]
    pub key: String,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print one setting
    Get { key: String },
    /// Store a setting (user_quota, group_quota, file_limit)
    Set { key: String, value: String },
    /// Print every stored setting and the effective policy
    List,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "docvault",
            &mut std::io::stdout(),
        );
    }
}

fn parse_type(s: &str) -> Result<TagType, String> {
    let ty: TagType = s.parse().map_err(|e| format!("{e}"))?;
    if ty.is_empty() {
        return Err("tag type must set at least one bit".to_string());
    }
    Ok(ty)
}

fn split_spec(s: &str) -> Result<(TagType, &str), String> {
    let (types, word) = s
        .split_once(':')
        .ok_or_else(|| format!("expected TYPES:word, got {s:?}"))?;
    if word.is_empty() {
        return Err(format!("empty word in {s:?}"));
    }
    Ok((parse_type(types)?, word))
}

fn parse_tag(s: &str) -> Result<Tag, String> {
    let (ty, word) = split_spec(s)?;
    Ok(Tag::new(word, ty))
}

fn parse_regex(s: &str) -> Result<Tag, String> {
    let (ty, pattern) = split_spec(s)?;
    Ok(Tag::regex(pattern, ty))
}
