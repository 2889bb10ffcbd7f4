use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("lineage")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("lineage")
        .about("Records which page led to which during a crawl and attributes datasets to their publishers")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress non-essential output").global(true).required(false))
        .arg(
            arg!(-v --"verbose" "Log debug output (RUST_LOG still wins)")
                .global(true)
                .required(false),
        )
        .arg(
            arg!(-r --"root" <PATH>)
                .global(true)
                .required(false)
                .help("Data root; graphs are kept under <root>/graphs/<pipeline> [env: LINEAGE_ROOT]")
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            arg!(-p --"pipeline" <NAME>)
                .global(true)
                .required(false)
                .help("Pipeline name, used for the graph directory and file names [env: LINEAGE_PIPELINE]"),
        )
        .subcommand_required(true)
        .subcommand(
            command!("crawl")
                .about("Crawl one or more hosts and save the provenance graph")
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("The URL to crawl")
                        .value_parser(clap::value_parser!(Url))
                        .conflicts_with("hosts-file"),
                )
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of URLs to crawl")
                        .value_parser(clap::value_parser!(std::path::PathBuf))
                        .conflicts_with("url"),
                )
                .arg(
                    arg!(-t --"threads" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of async worker 'threads' in the worker pool.")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(
                    arg!(-d --"depth" <DEPTH>)
                        .required(false)
                        .help("Maximum link depth from each start URL")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"auto-follow")
                        .required(false)
                        .help("Follow links onto other hosts (default: stay on the start host)")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"dot")
                        .required(false)
                        .help("Also write a Graphviz .dot file next to the snapshot")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("tag")
                .about("Apply dataset/collection roles from a tag file to the saved graph")
                .arg(
                    arg!(-f --"file" <PATH>)
                        .required(true)
                        .help("Lines of `collection <url>` or `dataset <url> [<collection-url> ...]`")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
        .subcommand(
            command!("link")
                .about("Identify sources and attribute them to collections and datasets"),
        )
        .subcommand(
            command!("dedup")
                .about("Drop dataset vertices whose records did not survive deduplication")
                .arg(
                    arg!(-k --"kept" <PATH>)
                        .required(true)
                        .help("Newline-delimited list of kept dataset record files")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(--"output-root" <PATH>)
                        .required(false)
                        .help("Prefix stripped from every kept entry [env: LINEAGE_OUTPUT_ROOT]")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
        .subcommand(
            command!("export")
                .about("Write the page legend, attribution records and a rendering of the saved graph")
                .arg(
                    arg!(--"include-datasets")
                        .required(false)
                        .help("Draw dataset vertices in the rendering")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"dot")
                        .required(false)
                        .help("Also write a Graphviz .dot file")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"max-vertices" <COUNT>)
                        .required(false)
                        .help("Largest number of vertices drawn")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .subcommand(
            command!("inspect")
                .about("Print graph statistics, or the lineage of one page")
                .arg(
                    arg!([URL])
                        .required(false)
                        .help("Page to show; omit for whole-graph statistics"),
                ),
        )
}
