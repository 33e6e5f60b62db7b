use anyhow::{Context, anyhow, bail};
use phamrecon::{
    about,
    batch::{BatchDriver, compare_files},
    community::{CommunityClient, OfflineCommunity, PhagesDbClient},
    config::ImportConfig,
    import_table::read_import_table,
    store::MemoryStore,
};
use serde::Serialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const GENOME_EXTENSIONS: [&str; 6] = ["gb", "gbk", "gbf", "gbff", "txt", "gz"];

fn usage() {
    eprintln!(
        "Usage:\n  \
  phamrecon --version\n  \
  phamrecon [--config PATH] init-config PATH\n  \
  phamrecon [--config PATH] import TABLE.csv GENOME_FOLDER --store STORE.json [--output DIR] [--prod] [--offline]\n  \
  phamrecon [--config PATH] compare ARCHIVE.gb NEW.gb\n\n  \
  Log verbosity follows RUST_LOG (default: phamrecon=info)"
    );
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "phamrecon=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("Could not serialize JSON output")?;
    println!("{text}");
    Ok(())
}

fn parse_global_config_arg(args: &[String]) -> anyhow::Result<(ImportConfig, usize)> {
    if args.len() >= 3 && args[1] == "--config" {
        let config = ImportConfig::load_from_path(Path::new(&args[2]))?;
        return Ok((config, 3));
    }
    Ok((ImportConfig::default(), 1))
}

/// Value following `flag`, if the flag is present.
fn flag_value<'a>(args: &'a [String], flag: &str) -> anyhow::Result<Option<&'a str>> {
    match args.iter().position(|a| a == flag) {
        Some(i) => args
            .get(i + 1)
            .map(|v| Some(v.as_str()))
            .ok_or_else(|| anyhow!("{flag} needs a value")),
        None => Ok(None),
    }
}

fn has_genome_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| GENOME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn list_genome_files(folder: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = vec![];
    for entry in fs::read_dir(folder)
        .with_context(|| format!("Could not read genome folder '{}'", folder.display()))?
    {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        if path.is_file() && !hidden && has_genome_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn run_import(args: &[String], mut config: ImportConfig) -> anyhow::Result<()> {
    if args.len() < 2 {
        usage();
        bail!("import needs TABLE.csv and GENOME_FOLDER");
    }
    let table = Path::new(&args[0]);
    let folder = Path::new(&args[1]);
    let store_path =
        flag_value(args, "--store")?.ok_or_else(|| anyhow!("import needs --store STORE.json"))?;
    if let Some(output) = flag_value(args, "--output")? {
        config.output_folder = PathBuf::from(output);
    }
    if args.iter().any(|a| a == "--prod") {
        config.prod_run = true;
    }

    let rows = read_import_table(table)?;
    let files = list_genome_files(folder)?;
    let mut store = MemoryStore::load_from_path(Path::new(store_path))?;
    let community: Box<dyn CommunityClient> = if args.iter().any(|a| a == "--offline") {
        Box::new(OfflineCommunity)
    } else {
        Box::new(PhagesDbClient::new(&config.community_base_url)?)
    };
    let parser = config.parser();

    let run = BatchDriver::new(&mut store, community.as_ref(), &parser, &config).run(&rows, &files)?;
    fs::create_dir_all(&config.output_folder).with_context(|| {
        format!("Could not create output folder '{}'", config.output_folder.display())
    })?;
    run.write_results(&config.output_folder)?;
    print_json(&run.report.outcome_tally())
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        bail!("Missing command");
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", about::version_cli_text());
        return Ok(());
    }

    let (config, cmd_idx) = parse_global_config_arg(&args)?;
    if args.len() <= cmd_idx {
        usage();
        bail!("Missing command");
    }
    let rest = &args[cmd_idx + 1..];

    match args[cmd_idx].as_str() {
        "init-config" => {
            let path = rest.first().ok_or_else(|| anyhow!("init-config needs PATH"))?;
            config.save_to_path(Path::new(path))?;
            Ok(())
        }
        "import" => run_import(rest, config),
        "compare" => {
            if rest.len() < 2 {
                usage();
                bail!("compare needs ARCHIVE.gb and NEW.gb");
            }
            let parser = config.parser();
            let summary = compare_files(
                &parser,
                Path::new(&rest[0]),
                Path::new(&rest[1]),
                config.description_field,
            )?;
            print_json(&summary)
        }
        other => {
            usage();
            bail!("Unknown command '{other}'")
        }
    }
}

fn main() {
    init_logging();
    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
