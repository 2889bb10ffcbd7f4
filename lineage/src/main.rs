use colored::Colorize;
use commands::command_argument_builder;
use lineage::handlers::{
    handle_crawl, handle_dedup, handle_export, handle_inspect, handle_link, handle_tag,
    resolve_config,
};
use tracing_subscriber::EnvFilter;

mod commands;

#[tokio::main]
async fn main() {
    let matches = command_argument_builder().get_matches();
    let quiet = matches.get_flag("quiet");
    let verbose = matches.get_flag("verbose");

    init_tracing(verbose);
    let config = resolve_config(&matches);

    let outcome = match matches.subcommand() {
        Some(("crawl", args)) => handle_crawl(args, config, quiet).await,
        Some(("tag", args)) => handle_tag(args, config, quiet),
        Some(("link", _)) => handle_link(config, quiet),
        Some(("dedup", args)) => handle_dedup(args, config, quiet),
        Some(("export", args)) => handle_export(args, config, quiet),
        Some(("inspect", args)) => handle_inspect(args, config),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = outcome {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "lineage=debug" } else { "lineage=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
