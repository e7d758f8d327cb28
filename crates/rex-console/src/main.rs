use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rex_console::explore::{
    render_history, render_stats, run_exploration, ExploreOptions, BUNDLED_FIXTURE,
};
use rex_console::logging::init_logging;
use rex_console::simulator::{run_simulator, SimulatorConfig};
use rex_engine::ExplorerConfig;
use rex_gateway::MemoryRepository;
use std::path::PathBuf;
use std::sync::Arc;

fn cli() -> Command {
    Command::new("rex")
        .version(rex_console::VERSION)
        .about("Repository explorer: generation-indexed exploration of metadata repositories")
        .subcommand_required(true)
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .default_value("warn")
                .help("Log level (RUST_LOG overrides)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Write logs as JSON lines"),
        )
        .subcommand(
            Command::new("explore")
                .about("Explore from an entity in a fixture repository")
                .arg(
                    Arg::new("fixture")
                        .long("fixture")
                        .value_parser(value_parser!(PathBuf))
                        .help("Repository fixture (JSON); the bundled Coco glossary if omitted"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Engine configuration (TOML)"),
                )
                .arg(
                    Arg::new("server-name")
                        .long("server-name")
                        .default_value("cocoMDS1")
                        .help("Server name"),
                )
                .arg(
                    Arg::new("server-url")
                        .long("server-url")
                        .default_value("https://localhost:9443")
                        .help("Server URL root"),
                )
                .arg(
                    Arg::new("enterprise")
                        .long("enterprise")
                        .action(ArgAction::SetTrue)
                        .help("Include instances homed in other repositories"),
                )
                .arg(
                    Arg::new("entity")
                        .long("entity")
                        .required(true)
                        .help("Guid of the starting entity"),
                )
                .arg(
                    Arg::new("depth")
                        .long("depth")
                        .value_parser(value_parser!(u32))
                        .help("Traversal depth (configured default if omitted)"),
                )
                .arg(
                    Arg::new("entity-type")
                        .long("entity-type")
                        .action(ArgAction::Append)
                        .help("Keep only this entity type (repeatable)"),
                )
                .arg(
                    Arg::new("relationship-type")
                        .long("relationship-type")
                        .action(ArgAction::Append)
                        .help("Keep only this relationship type (repeatable)"),
                )
                .arg(
                    Arg::new("classification")
                        .long("classification")
                        .action(ArgAction::Append)
                        .help("Keep only entities with this classification (repeatable)"),
                )
                .arg(
                    Arg::new("search")
                        .long("search")
                        .help("Entity search committed after the traversal"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run the exploration simulator")
                .arg(
                    Arg::new("ops")
                        .long("ops")
                        .default_value("1000")
                        .value_parser(value_parser!(u64))
                        .help("Number of operations to simulate"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("entities")
                        .long("entities")
                        .default_value("40")
                        .value_parser(value_parser!(usize))
                        .help("Entities in the generated repository"),
                )
                .arg(
                    Arg::new("relationships")
                        .long("relationships")
                        .default_value("80")
                        .value_parser(value_parser!(usize))
                        .help("Relationships in the generated repository"),
                )
                .arg(
                    Arg::new("latency-ms")
                        .long("latency-ms")
                        .default_value("0")
                        .value_parser(value_parser!(u64))
                        .help("Latency added to every gateway call"),
                )
                .arg(
                    Arg::new("keep-going")
                        .long("keep-going")
                        .action(ArgAction::SetTrue)
                        .help("Continue after the first violation"),
                ),
        )
}

/// Value of an argument that has a default
fn arg<T: Clone + Send + Sync + 'static>(args: &ArgMatches, name: &str) -> anyhow::Result<T> {
    args.get_one::<T>(name)
        .cloned()
        .with_context(|| format!("missing --{name}"))
}

fn values(args: &ArgMatches, name: &str) -> Vec<String> {
    args.get_many::<String>(name)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

async fn explore(args: &ArgMatches) -> anyhow::Result<()> {
    let repository = match args.get_one::<PathBuf>("fixture") {
        Some(path) => MemoryRepository::from_path(path)
            .with_context(|| format!("loading fixture {}", path.display()))?,
        None => MemoryRepository::from_json_str(BUNDLED_FIXTURE)?,
    };
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => ExplorerConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => ExplorerConfig::default(),
    };

    let mut server = config.server(
        arg::<String>(args, "server-name")?,
        arg::<String>(args, "server-url")?,
    );
    if args.get_flag("enterprise") {
        server = server.with_enterprise(true);
    }
    let options = ExploreOptions {
        server,
        entity: arg::<String>(args, "entity")?,
        depth: args.get_one::<u32>("depth").copied(),
        entity_types: values(args, "entity-type"),
        relationship_types: values(args, "relationship-type"),
        classifications: values(args, "classification"),
        search: args.get_one::<String>("search").cloned(),
    };

    let report = run_exploration(Arc::new(repository), config, &options).await?;
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if let Some(stats) = &report.stats {
            println!("{}", render_stats(stats));
        }
        print!("{}", render_history(&report.history));
    }
    Ok(())
}

async fn simulate(args: &ArgMatches) -> anyhow::Result<bool> {
    let config = SimulatorConfig {
        seed: arg(args, "seed")?,
        operations: arg(args, "ops")?,
        entities: arg(args, "entities")?,
        relationships: arg(args, "relationships")?,
        latency_ms: arg(args, "latency-ms")?,
        stop_on_first_violation: !args.get_flag("keep-going"),
    };

    println!("Running REX Simulator...");
    println!("Operations: {}", config.operations);
    println!("Seed: {}", config.seed);
    println!();

    let report = run_simulator(config).await?;
    println!("{}", report.generate_text());
    Ok(report.passed())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_logging(
        &arg::<String>(&matches, "log-level")?,
        matches.get_flag("log-json"),
    )?;

    match matches.subcommand() {
        Some(("explore", args)) => explore(args).await,
        Some(("simulate", args)) => {
            let passed = simulate(args).await?;
            std::process::exit(if passed { 0 } else { 1 });
        }
        _ => anyhow::bail!("unknown subcommand"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn explore_collects_repeated_filters() {
        let matches = cli()
            .try_get_matches_from([
                "rex",
                "explore",
                "--entity",
                "term-patient",
                "--entity-type",
                "Asset",
                "--entity-type",
                "Glossary",
                "--depth",
                "2",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(values(args, "entity-type"), vec!["Asset", "Glossary"]);
        assert_eq!(args.get_one::<u32>("depth"), Some(&2));
        assert!(values(args, "classification").is_empty());
    }

    #[tokio::test]
    async fn explore_reads_fixture_and_config_files() {
        let mut fixture = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut fixture, BUNDLED_FIXTURE.as_bytes()).unwrap();
        let mut config = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut config, b"default_depth = 2\n").unwrap();

        let matches = cli()
            .try_get_matches_from([
                "rex".into(),
                "explore".into(),
                "--entity".into(),
                "glossary-coco".into(),
                "--fixture".into(),
                fixture.path().as_os_str().to_owned(),
                "--config".into(),
                config.path().as_os_str().to_owned(),
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        explore(args).await.unwrap();
    }

    #[tokio::test]
    async fn explore_reports_missing_fixture() {
        let matches = cli()
            .try_get_matches_from([
                "rex",
                "explore",
                "--entity",
                "glossary-coco",
                "--fixture",
                "/nonexistent/fixture.json",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        let err = explore(args).await.unwrap_err();
        assert!(err.to_string().contains("loading fixture"));
    }

    #[test]
    fn explore_requires_entity() {
        assert!(cli().try_get_matches_from(["rex", "explore"]).is_err());
    }

    #[test]
    fn simulate_defaults() {
        let matches = cli().try_get_matches_from(["rex", "simulate"]).unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(arg::<u64>(args, "ops").unwrap(), 1000);
        assert_eq!(arg::<u64>(args, "seed").unwrap(), 42);
        assert!(!args.get_flag("keep-going"));
        assert_eq!(arg::<String>(&matches, "log-level").unwrap(), "warn");
    }
}
