//! CLI argument surface and command dispatch.

pub mod output;

use clap::Parser;
use std::path::PathBuf;

use crate::config::default_db_path;
use crate::error::{Result, XraysError};
use crate::git::{Git2History, Git2Source, GitRepository};
use crate::orchestrator::{Orchestrator, Selection};
use crate::store::RunStore;
use crate::web;

/// Behavioral & Architectural Code Intelligence for git repositories.
#[derive(Parser, Debug)]
#[command(name = "analyze-repo")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a local git repository
    pub repo_path: Option<PathBuf>,

    /// Analysis window, e.g. 90d
    #[arg(long, value_parser = parse_window, default_value = "90d", value_name = "DAYS")]
    pub window: u32,

    /// Show knowledge distribution analysis
    #[arg(long)]
    pub knowledge: bool,

    /// Show temporal coupling and PAIN analysis
    #[arg(long)]
    pub coupling: bool,

    /// Show anemic domain model analysis
    #[arg(long)]
    pub anemia: bool,

    /// Show function-level complexity analysis
    #[arg(long)]
    pub complexity: bool,

    /// Show god class analysis
    #[arg(long = "god-classes")]
    pub god_classes: bool,

    /// Show change clustering analysis
    #[arg(long)]
    pub clustering: bool,

    /// Show effort modeling analysis (REI scores)
    #[arg(long)]
    pub effort: bool,

    /// Show Developer Experience analysis
    #[arg(long)]
    pub dx: bool,

    /// Run all analyses and store the snapshot
    #[arg(long = "all", conflicts_with_all = ["from_ref", "to_ref"])]
    pub run_all: bool,

    /// Anchor analysis at a commit, tag, branch, or date
    #[arg(long, value_name = "REF", conflicts_with_all = ["from_ref", "to_ref"])]
    pub at: Option<String>,

    /// Start ref for hotspot comparison (requires --to)
    #[arg(long = "from", value_name = "REF", requires = "to_ref")]
    pub from_ref: Option<String>,

    /// End ref for hotspot comparison (requires --from)
    #[arg(long = "to", value_name = "REF", requires = "from_ref")]
    pub to_ref: Option<String>,

    /// Run store path (default: ~/.git-xrays/runs.db)
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// List stored runs, then exit
    #[arg(long)]
    pub list_runs: bool,

    /// Serve the REST API over the run store
    #[arg(long)]
    pub serve: bool,

    /// REST API port
    #[arg(long, default_value = "7700", value_name = "P")]
    pub port: u16,
}

fn parse_window(value: &str) -> std::result::Result<u32, String> {
    let pattern = regex::Regex::new(r"^(\d+)d$").expect("valid pattern");
    pattern
        .captures(value)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| format!("Invalid window format '{value}'. Use <number>d, e.g. 90d"))
}

pub fn run(cli: Cli) -> Result<()> {
    let db_path = cli.db.clone().unwrap_or_else(default_db_path);

    if cli.serve {
        return web::run_server(db_path, cli.port)
            .map_err(|e| XraysError::Store(e.to_string()));
    }

    if cli.list_runs {
        let store = RunStore::open(&db_path)?;
        let runs = store.all_runs()?;
        print!("{}", output::render_runs_table(&runs));
        return Ok(());
    }

    let repo_path = cli
        .repo_path
        .as_deref()
        .ok_or_else(|| XraysError::Input("repo_path is required".to_string()))?;

    let history = Git2History::open(repo_path)?;
    let source = Git2Source::open(repo_path)?;
    let repo_display = repo_path.display().to_string();
    let orchestrator = Orchestrator::new(&history, &source, repo_display);

    // --from/--to: hotspot comparison, no persistence.
    if let (Some(from_ref), Some(to_ref)) = (&cli.from_ref, &cli.to_ref) {
        let report = orchestrator.compare_hotspots(cli.window, from_ref, to_ref)?;
        print!("{}", output::render_comparison(&report));
        return Ok(());
    }

    let summary = orchestrator.summary()?;
    let snapshot = match &cli.at {
        Some(reference) => {
            let instant = history.resolve_ref(reference)?;
            Some((
                reference.clone(),
                instant.format("%Y-%m-%d %H:%M:%S").to_string(),
            ))
        }
        None => None,
    };
    print!(
        "{}",
        output::render_summary(
            &summary,
            snapshot.as_ref().map(|(r, d)| (r.as_str(), d.as_str())),
        )
    );
    if summary.commit_count == 0 {
        println!("No commits found.");
        return Ok(());
    }

    if cli.run_all {
        let store = RunStore::open(&db_path)?;
        let (run, bundle) =
            orchestrator.run_and_store(&store, cli.window, cli.at.as_deref())?;
        println!("\n{}", output::render_hotspots(&bundle.hotspots));
        println!("{}", output::render_knowledge(&bundle.knowledge));
        println!("{}", output::render_coupling(&bundle.coupling));
        println!("{}", output::render_anemic(&bundle.anemic));
        println!("{}", output::render_complexity(&bundle.complexity));
        println!("{}", output::render_god_classes(&bundle.god_classes));
        println!("{}", output::render_clustering(&bundle.clustering));
        println!("{}", output::render_effort(&bundle.effort));
        println!("{}", output::render_dx(&bundle.dx));
        println!("Run stored: {}", run.run_id);
        return Ok(());
    }

    let selection = Selection {
        knowledge: cli.knowledge,
        coupling: cli.coupling,
        anemic: cli.anemia,
        complexity: cli.complexity,
        god_classes: cli.god_classes,
        clustering: cli.clustering,
        effort: cli.effort,
        dx: cli.dx,
    };
    let reports = orchestrator.run_selected(cli.window, cli.at.as_deref(), &selection)?;

    println!("\n{}", output::render_hotspots(&reports.hotspots));
    if cli.knowledge {
        if let Some(report) = &reports.knowledge {
            println!("{}", output::render_knowledge(report));
        }
    }
    if cli.coupling {
        if let Some(report) = &reports.coupling {
            println!("{}", output::render_coupling(report));
        }
    }
    if cli.anemia {
        if let Some(report) = &reports.anemic {
            println!("{}", output::render_anemic(report));
        }
    }
    if cli.complexity {
        if let Some(report) = &reports.complexity {
            println!("{}", output::render_complexity(report));
        }
    }
    if cli.god_classes {
        if let Some(report) = &reports.god_classes {
            println!("{}", output::render_god_classes(report));
        }
    }
    if cli.clustering {
        if let Some(report) = &reports.clustering {
            println!("{}", output::render_clustering(report));
        }
    }
    if cli.effort {
        if let Some(report) = &reports.effort {
            println!("{}", output::render_effort(report));
        }
    }
    if cli.dx {
        if let Some(report) = &reports.dx {
            println!("{}", output::render_dx(report));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn window_parser_accepts_day_suffix_only() {
        assert_eq!(parse_window("90d").unwrap(), 90);
        assert_eq!(parse_window("7d").unwrap(), 7);
        assert!(parse_window("90").is_err());
        assert!(parse_window("d").is_err());
        assert!(parse_window("90 days").is_err());
    }

    #[test]
    fn at_conflicts_with_from_to() {
        let err = Cli::try_parse_from([
            "analyze-repo", ".", "--at", "HEAD", "--from", "v1", "--to", "v2",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn all_conflicts_with_from_to() {
        let err = Cli::try_parse_from([
            "analyze-repo", ".", "--all", "--from", "v1", "--to", "v2",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn from_requires_to() {
        let err = Cli::try_parse_from(["analyze-repo", ".", "--from", "v1"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
