use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use lineage_core::builder::GraphBuilder;
use lineage_core::classify::Linker;
use lineage_core::crawl::{CrawlOptions, execute_crawl};
use lineage_core::dedup::{Deduplicator, KeptSet};
use lineage_core::lineage::dataset_lineage;
use lineage_core::model::VertexKey;
use lineage_core::{GraphStore, PipelineConfig, UrlNormalizer};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// One line of a tag file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagLine {
    Collection(String),
    Dataset { url: String, collections: Vec<String> },
}

// Helper functions for the crawl handler

/// Load URLs from either a file or a single URL argument
pub fn load_urls_from_source(
    url: Option<&Url>,
    hosts_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if let Some(url) = url {
        Ok(vec![url.as_str().to_string()])
    } else {
        Err("Either --url or --hosts-file must be provided".to_string())
    }
}

/// Load and parse URLs from a file
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| parse_url_line(line.trim()))
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add https:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if let Ok(url) = Url::parse(line)
        && url.has_host()
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("https://{}", line);
    if Url::parse(&with_scheme).is_ok() {
        return Some(with_scheme);
    }

    eprintln!("{} Skipping invalid URL '{}'", "⚠".yellow(), line);
    None
}

/// `Ok(None)` for blank lines and `#` comments.
pub fn parse_tag_line(line: &str) -> Result<Option<TagLine>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let kind = parts.next().unwrap_or_default();
    let Some(url) = parts.next() else {
        return Err(format!("Missing URL in '{}'", line));
    };
    let rest: Vec<String> = parts.map(str::to_string).collect();

    match kind {
        "collection" if rest.is_empty() => Ok(Some(TagLine::Collection(url.to_string()))),
        "collection" => Err(format!("A collection line takes one URL: '{}'", line)),
        "dataset" => Ok(Some(TagLine::Dataset {
            url: url.to_string(),
            collections: rest,
        })),
        other => Err(format!("Unknown tag '{}'", other)),
    }
}

pub fn load_tags_from_file(path: &Path) -> Result<Vec<TagLine>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read tag file {}", path.display()))?;

    let mut tags = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        match parse_tag_line(line) {
            Ok(Some(tag)) => tags.push(tag),
            Ok(None) => {}
            Err(e) => bail!("{}:{}: {}", path.display(), idx + 1, e),
        }
    }
    Ok(tags)
}

/// Applies every tag in order; stops at the first unknown page.
pub fn apply_tags(builder: &GraphBuilder, tags: &[TagLine]) -> Result<(usize, usize)> {
    let (mut collections, mut datasets) = (0, 0);
    for tag in tags {
        match tag {
            TagLine::Collection(url) => {
                builder.mark_collection(url)?;
                collections += 1;
            }
            TagLine::Dataset { url, collections: parents } => {
                builder.mark_dataset(url, parents)?;
                datasets += 1;
            }
        }
    }
    Ok((collections, datasets))
}

/// Environment first, then the global flags.
pub fn resolve_config(matches: &ArgMatches) -> PipelineConfig {
    let mut config = PipelineConfig::from_env();
    if let Some(root) = matches.get_one::<String>("root") {
        config = config.with_root(shellexpand::tilde(root).into_owned());
    }
    if let Some(pipeline) = matches.get_one::<String>("pipeline") {
        config = config.with_pipeline(pipeline.as_str());
    }
    config
}

fn load_store(config: &PipelineConfig) -> Result<Arc<GraphStore>> {
    let store = GraphStore::shared();
    let dir = config.graph_dir();
    debug!("Loading graph '{}' from {}", config.pipeline, dir.display());
    store
        .load(&dir, &config.pipeline)
        .with_context(|| format!("Failed to load graph '{}' from {}", config.pipeline, dir.display()))?;
    Ok(store)
}

fn save_store(store: &GraphStore, config: &PipelineConfig, quiet: bool) -> Result<()> {
    let dir = config.graph_dir();
    let saved = store
        .save(&dir, &config.pipeline, &config.render)
        .with_context(|| format!("Failed to save graph to {}", dir.display()))?;
    if !quiet {
        println!(
            "{} Saved {}",
            "✓".green().bold(),
            saved.latest.display().to_string().bright_white()
        );
    }
    Ok(())
}

pub async fn handle_crawl(args: &ArgMatches, config: PipelineConfig, quiet: bool) -> Result<()> {
    let mut config = config;
    config.render.write_dot = args.get_flag("dot");

    let urls = load_urls_from_source(
        args.get_one::<Url>("url"),
        args.get_one::<PathBuf>("hosts-file"),
    )
    .map_err(|e| anyhow!(e))?;

    let options = CrawlOptions {
        urls,
        threads: *args.get_one::<usize>("threads").unwrap_or(&10),
        max_depth: *args.get_one::<usize>("depth").unwrap_or(&3),
        auto_follow: args.get_flag("auto-follow"),
        timeout_secs: *args.get_one::<u64>("timeout").unwrap_or(&10),
        show_progress: !quiet,
    };

    if !quiet {
        println!("\n{} Crawling {} host(s)", "→".blue(), options.urls.len());
        println!("Workers: {}", options.threads);
        println!("Max depth: {}", options.max_depth);
        println!(
            "Cross-domain: {}\n",
            if options.auto_follow { "follow" } else { "same host only" }
        );
    }

    let store = GraphStore::shared();
    let builder = GraphBuilder::new(store.clone(), UrlNormalizer::new(config.normalizer.clone()));
    let progress: lineage_core::crawl::CrawlProgressCallback = Arc::new(move |msg: String| {
        if !quiet {
            println!("{}", msg);
        }
    });

    let summary = execute_crawl(options, &builder, Some(progress))
        .await
        .context("Crawl aborted; the graph was not saved")?;

    if !quiet {
        println!(
            "\n{} Crawl complete: {} pages, {} vertices",
            "✓".green().bold(),
            summary.pages.to_string().cyan(),
            summary.new_vertices.to_string().cyan()
        );
        for host in &summary.failed_hosts {
            println!("{} Failed to crawl {}", "✗".red().bold(), host);
        }
    }

    save_store(&store, &config, quiet)
}

pub fn handle_tag(args: &ArgMatches, config: PipelineConfig, quiet: bool) -> Result<()> {
    let path = args
        .get_one::<PathBuf>("file")
        .ok_or_else(|| anyhow!("--file is required"))?;
    let tags = load_tags_from_file(path)?;
    info!("Applying {} tags from {}", tags.len(), path.display());

    let store = load_store(&config)?;
    let builder = GraphBuilder::new(store.clone(), UrlNormalizer::new(config.normalizer.clone()));
    let (collections, datasets) = apply_tags(&builder, &tags)?;

    if !quiet {
        println!(
            "{} Tagged {} collections and {} datasets",
            "✓".green().bold(),
            collections.to_string().cyan(),
            datasets.to_string().cyan()
        );
    }
    save_store(&store, &config, quiet)
}

pub fn handle_link(config: PipelineConfig, quiet: bool) -> Result<()> {
    let store = load_store(&config)?;
    let report = Linker::new(store.clone()).run()?;

    if !quiet {
        println!("{} Linked {} collections", "✓".green().bold(), report.collections);
        println!("  {} new sources: {}", "•".blue(), report.sources_identified);
        println!("  {} collection links: {}", "•".blue(), report.collection_links);
        println!("  {} dataset attributions: {}", "•".blue(), report.dataset_attributions);
    }
    save_store(&store, &config, quiet)
}

pub fn handle_dedup(args: &ArgMatches, config: PipelineConfig, quiet: bool) -> Result<()> {
    let mut config = config;
    if let Some(output_root) = args.get_one::<PathBuf>("output-root") {
        config = config.with_output_root(output_root.clone());
    }
    let kept_path = args
        .get_one::<PathBuf>("kept")
        .ok_or_else(|| anyhow!("--kept is required"))?;

    let kept = KeptSet::from_file(
        kept_path,
        config.output_root.as_deref(),
        &UrlNormalizer::new(config.normalizer.clone()),
    )
    .with_context(|| format!("Failed to read kept file {}", kept_path.display()))?;

    let store = load_store(&config)?;
    let report = Deduplicator::new(store.clone()).run(&kept)?;

    if !quiet {
        println!(
            "{} Kept {} of {} datasets",
            "✓".green().bold(),
            (report.datasets - report.dropped).to_string().cyan(),
            report.datasets.to_string().cyan()
        );
        println!("  {} dropped: {}", "•".blue(), report.dropped);
        println!("  {} patched: {}", "•".blue(), report.patched);
        if report.reattached > 0 {
            println!(
                "  {} re-linked to root: {}",
                "⚠".yellow(),
                report.reattached
            );
        }
    }
    save_store(&store, &config, quiet)
}

pub fn handle_export(args: &ArgMatches, config: PipelineConfig, quiet: bool) -> Result<()> {
    let mut config = config;
    config.render.include_datasets = args.get_flag("include-datasets");
    config.render.write_dot = args.get_flag("dot");
    if let Some(max) = args.get_one::<usize>("max-vertices") {
        config.render.max_vertices = *max;
    }

    let store = load_store(&config)?;
    let dir = config.graph_dir();
    let legend = store.export_legend(&dir, &config.pipeline)?;
    let attribution = store.export_attribution(&dir, &config.pipeline)?;
    let (svg, dot) = store.export_rendering(&dir, &config.pipeline, &config.render)?;

    if !quiet {
        for path in [Some(legend), Some(attribution), Some(svg), dot]
            .into_iter()
            .flatten()
        {
            println!(
                "{} Wrote {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
    }
    Ok(())
}

pub fn handle_inspect(args: &ArgMatches, config: PipelineConfig) -> Result<()> {
    let store = load_store(&config)?;
    let graph = store.get()?;

    let Some(raw) = args.get_one::<String>("URL") else {
        let stats = graph.stats();
        println!("{}", format!("Graph '{}'", config.pipeline).bright_white().bold());
        println!("  Vertices:    {}", stats.vertices);
        println!("  Edges:       {}", stats.edges);
        println!("  Datasets:    {}", stats.datasets);
        println!("  Collections: {}", stats.collections);
        println!("  Sources:     {}", stats.sources);
        let orphans = graph.orphans();
        if !orphans.is_empty() {
            println!("  {} {} orphaned vertices", "⚠".yellow(), orphans.len());
        }
        return Ok(());
    };

    let url = UrlNormalizer::new(config.normalizer.clone()).normalize(raw)?;
    let key = VertexKey::Page(url);
    let vertex = graph.vertex_or_err(&key)?;

    println!("{} {}", vertex.label.bright_white().bold(), vertex.url());
    println!("  Title: {}", vertex.title);
    let roles: Vec<&str> = vertex.roles.iter().map(|r| r.as_str()).collect();
    println!(
        "  Roles: {}",
        if roles.is_empty() { "page".to_string() } else { roles.join(", ") }
    );
    println!("  Linked from: {}", graph.predecessors(&key).len());
    println!("  Links to:    {}", graph.successors(&key).len());

    if let Some(lineage) = dataset_lineage(&graph, &key)? {
        for membership in &lineage.collections {
            println!("  {} collection {} ({})", "→".blue(), membership.title, membership.url);
            for source in &membership.sources {
                println!("      {} source {} ({})", "→".blue(), source.title, source.url);
            }
        }
        for source in &lineage.nearest_sources {
            println!("  {} nearest source {} ({})", "→".blue(), source.title, source.url);
        }
        if !lineage.is_attributed() {
            println!("  {} not attributed to any source", "⚠".yellow());
        }
    }
    Ok(())
}
