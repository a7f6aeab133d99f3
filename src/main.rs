//! Tributary CLI - Main entry point.

use std::process;
use tributary::cli::{output, Cli, Commands};
use tributary::lineage::{export, export_value, validate, BuildOutput, QueryEngine};
use tributary::TributaryError;

fn main() {
    let cli = Cli::parse_args();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            output::error(format!("{:#}", e));
            let code = e
                .downcast_ref::<TributaryError>()
                .map_or(1, TributaryError::exit_code);
            process::exit(code);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    if let Commands::Version = cli.command {
        println!("Tributary v{}", env!("CARGO_PKG_VERSION"));
        println!("Lineage graph and impact analysis for data pipelines");
        return Ok(0);
    }

    let config = cli.load_config()?;
    tributary::observability::init(&config.observability)?;

    let BuildOutput { graph, warnings, stats } = tributary::load(&config)?;
    for warning in &warnings {
        output::warning(warning);
    }
    tracing::info!(
        events = stats.events_applied,
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "Lineage graph ready"
    );

    let engine = QueryEngine::new(&graph);
    let format = cli.output.document_format();

    match cli.command {
        Commands::Trace { reference, depth } => {
            let tree = engine.trace_upstream(&reference, depth.or(config.query.default_max_depth))?;
            match format {
                Some(format) => println!("{}", export_value(&tree, format)?),
                None => print!("{}", output::render_trace(&tree)),
            }
        }

        Commands::Impact { reference, depth } => {
            let impact =
                engine.analyze_downstream_impact(&reference, depth.or(config.query.default_max_depth))?;
            match format {
                Some(format) => println!("{}", export_value(&impact, format)?),
                None => print!("{}", output::render_impact(&impact)),
            }
        }

        Commands::Path { from, to, depth } => {
            let path = engine.find_path(&from, &to, depth.or(config.query.default_max_depth))?;
            match format {
                Some(format) => println!("{}", export_value(&path, format)?),
                None => println!("{}", output::render_path(path.as_deref())),
            }
        }

        Commands::Paths { reference, depth } => {
            let paths = engine.lineage_paths(&reference, depth.or(config.query.default_max_depth))?;
            match format {
                Some(format) => println!("{}", export_value(&paths, format)?),
                None => print!("{}", output::render_paths(&paths)),
            }
        }

        Commands::Validate { strict } => {
            let report = validate(&graph);
            match format {
                Some(format) => println!("{}", export_value(&report, format)?),
                None => print!("{}", output::render_validation(&report)),
            }
            if strict && report.has_findings() {
                return Ok(1);
            }
        }

        Commands::Export { format, output: path } => {
            let format = format.unwrap_or(config.export.format);
            let document = export(&graph, format, config.export.pretty)?;
            match path {
                Some(path) => {
                    std::fs::write(&path, document)?;
                    output::success(format!("Wrote {} export to {}", format, path.display()));
                }
                None => println!("{}", document),
            }
        }

        // printed before loading the graph
        Commands::Version => {}
    }

    Ok(0)
}
