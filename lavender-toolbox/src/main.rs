use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

pub mod maintain;
pub mod publish;
pub mod rewrite;

#[derive(Debug, Parser)]
#[command(name = "lavender", version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv). Use -q to quiet.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Decrease output. Overrides -v.
    #[arg(short = 'q', long, action = ArgAction::SetTrue, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where and how a module is published.
#[derive(Debug, Args)]
pub struct ModuleArgs {
    #[arg(value_name = "NAME", short, long, required = true, help = "Module name, also the index file name")]
    pub module: String,

    #[arg(
        value_name = "DOCROOT",
        short,
        long = "target",
        required = true,
        help = "Target docroot; repeat for every host of the cluster"
    )]
    pub targets: Vec<PathBuf>,

    #[arg(
        value_name = "INDEX_DIR",
        long,
        help = "Index directory relative to each docroot [default: .lavender]"
    )]
    pub index_dir: Option<PathBuf>,

    #[arg(long, help = "Publish under the resource path instead of content-addressed names")]
    pub literal: bool,

    #[arg(value_name = "PREFIX", long, default_value = "/", help = "Path the resources are served under")]
    pub resource_prefix: String,

    #[arg(value_name = "PREFIX", long, default_value = "", help = "Directory below the docroot to publish into")]
    pub target_prefix: String,

    #[arg(value_name = "GLOB", long = "include", help = "Only publish matching resources")]
    pub includes: Vec<String>,

    #[arg(value_name = "GLOB", long = "exclude", help = "Skip matching resources")]
    pub excludes: Vec<String>,

    #[arg(long, help = "Hash every resource instead of consulting the md5 cache")]
    pub no_cache: bool,
}

#[derive(Debug, Args)]
pub struct DocrootArgs {
    #[arg(value_name = "DOCROOT", short, long = "docroot", required = true, help = "Docroot; repeat for every host")]
    pub docroots: Vec<PathBuf>,

    #[arg(
        value_name = "INDEX_DIR",
        long,
        help = "Index directory relative to each docroot [default: .lavender]"
    )]
    pub index_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Publish a directory tree
    File {
        #[arg(value_name = "DIR", short, long, required = true, help = "Source directory")]
        source: PathBuf,
        #[command(flatten)]
        module: ModuleArgs,
    },
    /// Publish the entries of a zip or jar archive
    Jar {
        #[arg(value_name = "ARCHIVE", short, long, required = true, help = "Source archive")]
        archive: PathBuf,
        #[arg(
            value_name = "PREFIX",
            long,
            default_value = "",
            help = "Only entries below this prefix, e.g. META-INF/resources/"
        )]
        prefix: String,
        #[command(flatten)]
        module: ModuleArgs,
    },
    /// Show how a single file of a source directory would be published
    Probe {
        #[arg(value_name = "DIR", short, long, required = true, help = "Source directory")]
        source: PathBuf,
        #[arg(value_name = "PATH", short, long, required = true, help = "Resource path below the source")]
        path: String,
        #[command(flatten)]
        module: ModuleArgs,
    },
    /// Delete files no module index references
    Gc {
        #[command(flatten)]
        docroots: DocrootArgs,
        #[arg(long, help = "Only report what would be deleted")]
        dry_run: bool,
    },
    /// Check docroots against their indexes
    Validate {
        #[command(flatten)]
        docroots: DocrootArgs,
        #[arg(long, help = "Verify the md5 of every referenced file")]
        md5: bool,
        #[arg(long, help = "Rewrite broken all-indexes from the module indexes")]
        fix: bool,
    },
    /// Rewrite an HTML or CSS document as the rewrite service would
    Rewrite {
        #[arg(value_name = "URL", short, long, required = true, help = "URL the document is served from")]
        base: String,
        #[arg(value_name = "FILE", long, help = "Index file [default: LAVENDER_INDEX_FILE]")]
        index: Option<PathBuf>,
        #[arg(value_name = "FILE", long, help = "Node list [default: LAVENDER_NODES_FILE]")]
        nodes: Option<PathBuf>,
        #[arg(value_name = "PATH", long, help = "Context path [default: LAVENDER_CONTEXT_PATH]")]
        context_path: Option<String>,
        #[arg(long, help = "Treat the input as CSS instead of HTML")]
        css: bool,
        #[arg(value_name = "INPUT", help = "Input file, standard input if omitted")]
        input: Option<PathBuf>,
    },
}

fn setup_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => lavender_config::CONFIG.log_filter(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::File { source, module } => publish::publish_files(source, module),
        Commands::Jar {
            archive,
            prefix,
            module,
        } => publish::publish_jar(archive, prefix, module),
        Commands::Probe {
            source,
            path,
            module,
        } => publish::probe(source, path, module),
        Commands::Gc { docroots, dry_run } => maintain::gc(docroots, dry_run),
        Commands::Validate {
            docroots,
            md5,
            fix,
        } => maintain::validate(docroots, md5, fix),
        Commands::Rewrite {
            base,
            index,
            nodes,
            context_path,
            css,
            input,
        } => rewrite::rewrite(base, index, nodes, context_path, css, input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_arguments() {
        let cli = Cli::try_parse_from([
            "lavender", "file", "-s", "static", "-m", "web", "-t", "/srv/a", "-t", "/srv/b",
            "--include", "**/*.png", "--literal", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::File { source, module } = cli.command else {
            panic!("expected the file command");
        };
        assert_eq!(source, PathBuf::from("static"));
        assert_eq!(module.module, "web");
        assert_eq!(module.targets.len(), 2);
        assert_eq!(module.includes, ["**/*.png"]);
        assert!(module.literal);
        assert_eq!(module.resource_prefix, "/");
    }

    #[test]
    fn docroot_commands_need_a_docroot() {
        assert!(Cli::try_parse_from(["lavender", "gc", "--dry-run"]).is_err());
        let cli = Cli::try_parse_from(["lavender", "validate", "-d", "/srv/a", "--md5"]).unwrap();
        assert!(matches!(cli.command, Commands::Validate { md5: true, fix: false, .. }));
    }
}
