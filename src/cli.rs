use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use transmem::{
    ContextVector,
    LanguagePair,
    MemoryConfig,
    config::{DEFAULT_MIN_QUERY_SIZE, DEFAULT_WRITER_MEMORY_BUDGET},
};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(
    name = "transmem",
    about = "A fuzzy-match translation memory with exactly-once ingestion"
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

    /// Minimum number of candidates retrieved before rescoring
    #[arg(long, global = true, default_value_t = DEFAULT_MIN_QUERY_SIZE)]
    pub min_query_size: usize,

    /// Skip the n-gram rescoring pass
    #[arg(long, global = true)]
    pub no_rescore: bool,

    /// Index writer heap, in bytes
    #[arg(long, global = true, default_value_t = DEFAULT_WRITER_MEMORY_BUDGET)]
    pub writer_memory: usize,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn memory_config(&self) -> MemoryConfig {
        MemoryConfig {
            min_query_size: self.min_query_size,
            writer_memory_budget: self.writer_memory,
            rescore: !self.no_rescore,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply a JSON batch of translation units and deletions
    Apply(ApplyArgs),
    /// Find the stored translations closest to a sentence
    Search(SearchArgs),
    /// Print every stored translation unit
    Dump(DumpArgs),
    /// Show the last applied offset of every channel
    Positions(PositionsArgs),
    /// Show system status and statistics
    Status(StatusArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Apply --

#[derive(Debug, Parser)]
pub struct ApplyArgs {
    /// Batch file, or `-` for stdin
    pub file: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The sentence to translate
    pub sentence: String,

    /// Language pair, e.g. `en:it`
    #[arg(short, long)]
    pub direction: LanguagePair,

    /// Also search the private memories of this user
    #[arg(short, long)]
    pub user: Option<Uuid>,

    /// Memory weights, e.g. `10:0.8,12:0.2`
    #[arg(short, long)]
    pub context: Option<ContextVector>,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "10")]
    pub count: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Dump --

#[derive(Debug, Parser)]
pub struct DumpArgs {
    /// One JSON object per line
    #[arg(long)]
    pub json: bool,
}

// -- Positions --

#[derive(Debug, Parser)]
pub struct PositionsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
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
            "transmem",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_search_defaults() {
        let cli = Cli::parse_from([
            "transmem",
            "search",
            "the cat sat",
            "--direction",
            "en:it",
        ]);
        assert_eq!(cli.memory_config(), MemoryConfig::default());
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.sentence, "the cat sat");
                assert_eq!(args.direction.key(), "en__it");
                assert_eq!(args.count, 10);
                assert!(args.user.is_none());
                assert!(args.context.is_none());
                assert!(!args.json);
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn parse_search_with_context_and_user() {
        let user = Uuid::new_v4();
        let user_arg = user.to_string();
        let cli = Cli::parse_from([
            "transmem",
            "--no-rescore",
            "--min-query-size",
            "25",
            "search",
            "hello",
            "-d",
            "en__de",
            "--user",
            user_arg.as_str(),
            "--context",
            "10:0.8,12:0.2",
            "-n",
            "3",
        ]);
        let config = cli.memory_config();
        assert!(!config.rescore);
        assert_eq!(config.min_query_size, 25);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.user, Some(user));
                assert_eq!(args.count, 3);
                let context = args.context.unwrap();
                assert_eq!(context.weight(10), Some(0.8));
                assert_eq!(context.weight(12), Some(0.2));
            }
            _ => panic!("expected search command"),
        }
    }

    #[test]
    fn bad_direction_is_rejected() {
        let parsed = Cli::try_parse_from([
            "transmem",
            "search",
            "hello",
            "--direction",
            "english",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }
}
